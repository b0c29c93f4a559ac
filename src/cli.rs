use clap::{Parser, Subcommand};
use pill_id_common::RecordField;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pill-id")]
#[command(about = "錠剤写真の識別・服薬履歴ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 表・裏の写真から錠剤を識別して履歴に保存
    Identify {
        /// 表面の写真
        #[arg(required = true)]
        front: PathBuf,

        /// 裏面の写真
        #[arg(required = true)]
        back: PathBuf,

        /// 候補番号を指定（1始まり、省略時は対話選択）
        #[arg(short, long)]
        pick: Option<usize>,
    },

    /// 服薬履歴を表示/検索/消去
    History {
        /// 全フィールドを部分一致検索
        #[arg(short, long, conflicts_with_all = ["field", "clear"])]
        search: Option<String>,

        /// 絞り込むフィールド (name/shape/color/dosage)
        #[arg(short, long, requires = "value")]
        field: Option<RecordField>,

        /// 絞り込む値
        #[arg(long, requires = "field")]
        value: Option<String>,

        /// 履歴を全消去
        #[arg(long)]
        clear: bool,
    },

    /// 保存済みの2件の相互作用を確認（番号は1始まり）
    Compare {
        first: Option<usize>,

        #[arg(requires = "first")]
        second: Option<usize>,
    },

    /// 薬剤名2つの相互作用を確認
    Interactions {
        #[arg(required = true)]
        drug_a: String,

        #[arg(required = true)]
        drug_b: String,
    },

    /// 設定を表示/編集
    Config {
        /// 識別サービスのURLを設定
        #[arg(long)]
        set_recognition_url: Option<String>,

        /// 相互作用APIのURLを設定
        #[arg(long)]
        set_interaction_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
