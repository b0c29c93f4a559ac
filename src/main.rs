use anyhow::{bail, Context};
use clap::Parser;
use dialoguer::{Confirm, MultiSelect, Select};
use indicatif::ProgressBar;
use pill_id_common::{CandidateMatch, InteractionWarning, MedicationRecord, RecordField};
use pill_id_rust::auth::LocalAuth;
use pill_id_rust::cli::{Cli, Commands};
use pill_id_rust::config::Config;
use pill_id_rust::history::KeyValueStore;
use pill_id_rust::identify::{read_photo, OpenFdaClient, RecognitionClient};
use pill_id_rust::interactions::{InteractionChecker, InteractionHttpSource};
use pill_id_rust::pipeline::{CapturePipeline, ConfirmOutcome, PhotoSide, SubmissionOutcome};
use pill_id_rust::{logging, HistoryStore, PillIdError};
use std::path::Path;
use std::time::Duration;

const SHOWN_SIDE_EFFECTS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let mut config = Config::load()?;

    match cli.command {
        Commands::Identify { front, back, pick } => {
            run_identify(&config, &front, &back, pick).await?;
        }

        Commands::History { search, field, value, clear } => {
            println!("📋 pill-id - 服薬履歴\n");

            let mut store = HistoryStore::open(config.data_dir()?);
            if let Err(e) = store.load() {
                println!("⚠ {}", e);
            }

            if clear {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete all {} saved pills?", store.len()))
                    .default(false)
                    .interact()?;
                if confirmed {
                    store.clear()?;
                    println!("✔ History cleared");
                }
                return Ok(());
            }

            match (search, field, value) {
                (Some(term), _, _) => {
                    let found = store.search(&term);
                    println!("{} match(es) for \"{}\"", found.len(), term);
                    print_records(&found, false);
                }
                (None, Some(field), Some(value)) => {
                    let found = store.filter_by(field, &value);
                    println!("{} match(es) for {} = \"{}\"", found.len(), field_label(field), value);
                    print_records(&found, false);
                }
                _ => {
                    if store.is_empty() {
                        println!("No pills saved yet. Run `pill-id identify` first.");
                    } else {
                        print_records(&store.get_all(), true);
                    }
                }
            }
        }

        Commands::Compare { first, second } => {
            println!("🔍 pill-id - 相互作用チェック\n");

            let mut store = HistoryStore::open(config.data_dir()?);
            store.load()?;
            if store.len() < 2 {
                bail!("At least two saved pills are needed to compare (found {})", store.len());
            }

            let (a, b) = match (first, second) {
                (Some(a), Some(b)) => store.pick_pair(a, b)?,
                (Some(_), None) => bail!("Give two history numbers, or none to choose interactively"),
                _ => choose_two(&store)?,
            };

            let checker = InteractionChecker::new(InteractionHttpSource::new(
                config.interaction_url()?,
                config.timeout(),
            )?);

            println!("[1/1] {} × {} を確認中...", a.drug_token(), b.drug_token());
            let warnings = checker.compare_records(&a, &b).await;
            print_warnings(&warnings);
        }

        Commands::Interactions { drug_a, drug_b } => {
            println!("🔍 pill-id - 相互作用チェック\n");

            let checker = InteractionChecker::new(InteractionHttpSource::new(
                config.interaction_url()?,
                config.timeout(),
            )?);

            println!("[1/1] {} × {} を確認中...", drug_a, drug_b);
            let warnings = checker.compare(&drug_a, &drug_b).await;
            print_warnings(&warnings);
        }

        Commands::Config { set_recognition_url, set_interaction_url, show } => {
            if let Some(url) = set_recognition_url {
                config.set_recognition_url(url)?;
                println!("✔ Recognition URL saved");
            }

            if let Some(url) = set_interaction_url {
                config.set_interaction_url(url)?;
                println!("✔ Interaction URL saved");
            }

            if show {
                println!("Config file: {}", Config::config_path()?.display());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

async fn run_identify(config: &Config, front: &Path, back: &Path, pick: Option<usize>) -> anyhow::Result<()> {
    println!("💊 pill-id - 錠剤識別\n");

    let auth = LocalAuth::from_config(config);
    let mut pipeline = CapturePipeline::new(config.timeout());

    // 1. 写真
    println!("[1/4] 写真を読み込み中...");
    pipeline.begin_capture(&auth, PhotoSide::Front)?;
    pipeline.capture(PhotoSide::Front, read_photo(front)?)?;
    pipeline.begin_capture(&auth, PhotoSide::Back)?;
    let submission = pipeline
        .capture(PhotoSide::Back, read_photo(back)?)?
        .context("photos were not submitted")?;
    println!("✔ 表・裏の2枚を読み込み\n");

    // 2. 識別 + 副作用
    println!("[2/4] 識別中...");
    let recognizer = RecognitionClient::new(&config.recognition_url, config.timeout())?;
    let side_effects = OpenFdaClient::new(&config.side_effect_url, config.timeout())?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Analyzing photos...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let outcome = pipeline.identify(submission, &recognizer, &side_effects).await;
    spinner.finish_and_clear();

    match outcome {
        SubmissionOutcome::Candidates(count) => println!("✔ {}件の候補\n", count),
        SubmissionOutcome::Failed(failure) => bail!(failure.message()),
        SubmissionOutcome::Stale => bail!("recognition response arrived for an outdated request"),
    }

    // 3. 選択
    println!("[3/4] 候補を選択...");
    let candidates = pipeline.candidates();
    print_candidates(&candidates);

    let index = match pick {
        Some(n) => n
            .checked_sub(1)
            .ok_or_else(|| PillIdError::InvalidSelection("candidate numbers start at 1".into()))?,
        None => {
            let items: Vec<String> = candidates.iter().map(candidate_label).collect();
            Select::new()
                .with_prompt("Which pill is it?")
                .items(&items)
                .default(0)
                .interact()?
        }
    };
    let chosen = pipeline.select(index)?;
    println!("✔ {}\n", chosen.title);

    // 4. 保存
    println!("[4/4] 履歴に保存中...");
    let mut store = HistoryStore::open(config.data_dir()?);
    match pipeline.confirm(&mut store)? {
        ConfirmOutcome::Saved(record) => println!("✔ 保存しました: {}", record.name()),
        ConfirmOutcome::AlreadySaved => println!("✔ 履歴に登録済みです"),
        ConfirmOutcome::Busy => println!("⚠ 保存処理が実行中です"),
    }

    println!("\n✅ 識別完了");
    Ok(())
}

fn candidate_label(c: &CandidateMatch) -> String {
    format!("{} | {} | {} | {}", c.title, c.strength, c.color, c.shape)
}

fn print_candidates(candidates: &[CandidateMatch]) {
    for (i, c) in candidates.iter().enumerate() {
        println!("  {}. {}", i + 1, candidate_label(c));
        println!("     Imprint: {}", c.imprint);
        if !c.side_effects.is_empty() {
            let shown: Vec<&str> = c
                .side_effects
                .iter()
                .take(SHOWN_SIDE_EFFECTS)
                .map(String::as_str)
                .collect();
            let more = c.side_effects.len().saturating_sub(SHOWN_SIDE_EFFECTS);
            if more > 0 {
                println!("     Side effects: {} (+{} more)", shown.join(", "), more);
            } else {
                println!("     Side effects: {}", shown.join(", "));
            }
        }
    }
}

fn record_label(r: &MedicationRecord) -> String {
    let saved = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(r.timestamp())
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| r.timestamp().to_string());
    format!("{} | {} | {} | {} | {}", r.name(), r.dosage(), r.shape(), r.color(), saved)
}

fn print_records(records: &[MedicationRecord], numbered: bool) {
    for (i, r) in records.iter().enumerate() {
        if numbered {
            println!("  {}. {}", i + 1, record_label(r));
        } else {
            println!("  - {}", record_label(r));
        }
    }
}

fn field_label(field: RecordField) -> &'static str {
    match field {
        RecordField::Name => "name",
        RecordField::Shape => "shape",
        RecordField::Color => "color",
        RecordField::Dosage => "dosage",
    }
}

/// 履歴から2件だけ選ばせる
fn choose_two<K: KeyValueStore>(
    store: &HistoryStore<K>,
) -> anyhow::Result<(MedicationRecord, MedicationRecord)> {
    let items: Vec<String> = store.get_all().iter().map(record_label).collect();
    let chosen = MultiSelect::new()
        .with_prompt("Select exactly two pills (space to toggle, enter to confirm)")
        .items(&items)
        .interact()?;

    match chosen.as_slice() {
        [a, b] => Ok(store.pick_pair(a + 1, b + 1)?),
        _ => bail!("Please select exactly two pills (selected {})", chosen.len()),
    }
}

fn print_warnings(warnings: &[InteractionWarning]) {
    if warnings.is_empty() {
        println!("✔ No known interactions");
        return;
    }

    for w in warnings {
        println!("\n⚠ {}", w.title);
        if !w.is_error() {
            println!("   Applies to: {}", w.applies_to);
        }
        println!("   {}", w.description);
    }
}
