//! HOC Card Wizard
//!
//! Terminal rendition of the four-step card. Walks the observer through
//! each step, refuses to advance past validation errors, and submits
//! through the backend configured by `HOC_BACKEND_URL`.

use anyhow::{bail, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use hoc_card::client::{HttpHocApi, SubmissionDispatcher, SubmissionError};
use hoc_card::config::ClientConfig;
use hoc_card::form::store::LAST_STEP;
use hoc_card::form::{
    Evidence, EvidenceFile, Field, FormAction, FormStore, StopWorkAuthority, TagGroup, ValidationErrors, TAG_NONE,
    TAG_OTHERS,
};

const STEP_TITLES: [&str; 4] = ["Observation Details", "Incident Narrative", "Rules & Causes", "Stop Work & Evidence"];

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        bail!("Input closed");
    }
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompt for a field, keeping its current value on empty input
fn edit(store: &mut FormStore, field: Field, label: &str, current: String) -> Result<()> {
    if let Some(error) = store.state().errors.get(field) {
        println!("   ⚠️  {}", error);
    }
    let label = if current.is_empty() {
        label.to_string()
    } else {
        format!("{} [{}]", label, current)
    };
    let input = prompt(&label)?;
    if !input.trim().is_empty() {
        store.update(field, input);
    }
    Ok(())
}

fn edit_details(store: &mut FormStore) -> Result<()> {
    let r = store.record().clone();
    edit(
        store,
        Field::Unsafe,
        "Unsafe act or condition (act/condition)",
        r.unsafe_kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
    )?;
    edit(store, Field::Location, "Location", r.location)?;
    edit(store, Field::ObserverName, "Observer name", r.observer_name)?;
    edit(store, Field::Company, "Company", r.company)?;
    edit(store, Field::Position, "Position", r.position)?;
    edit(
        store,
        Field::Date,
        "Date (YYYY-MM-DD)",
        r.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
    )?;
    edit(
        store,
        Field::Time,
        "Time (HH:MM)",
        r.time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
    )
}

fn edit_narrative(store: &mut FormStore) -> Result<()> {
    let r = store.record().clone();
    edit(store, Field::IncidentDetails, "Incident details", r.incident_details)?;
    edit(store, Field::CorrectiveActions, "Corrective actions", r.corrective_actions)
}

fn edit_tags(store: &mut FormStore, group: TagGroup, title: &str) -> Result<()> {
    println!("\n{}", title);
    let options: Vec<&str> = group
        .catalog()
        .iter()
        .copied()
        .chain([TAG_OTHERS, TAG_NONE])
        .collect();
    for (i, tag) in options.iter().enumerate() {
        let mark = if store.record().tags(group).contains(tag) { "x" } else { " " };
        println!("  [{}] {:>2}. {}", mark, i + 1, tag);
    }
    if let Some(error) = store.state().errors.get(group.field()) {
        println!("   ⚠️  {}", error);
    }

    let input = prompt("Toggle (comma-separated numbers, blank to keep)")?;
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<usize>().ok().and_then(|n| n.checked_sub(1)).and_then(|i| options.get(i)) {
            Some(tag) => store.toggle_tag(group, *tag),
            None => println!("   Ignoring '{}'", part),
        }
    }

    if store.record().tags(group).contains(TAG_OTHERS) {
        let current = store.record().elaboration(group).to_string();
        edit(store, group.elaboration_field(), "Please specify others", current)?;
    }
    Ok(())
}

async fn edit_stop_work(store: &mut FormStore) -> Result<()> {
    let r = store.record().clone();
    edit(
        store,
        Field::StopWorkEnforced,
        "Stop work authority enforced? (yes/no/n/a)",
        r.stop_work.map(|s| s.as_str().to_string()).unwrap_or_default(),
    )?;
    if store.record().stop_work == Some(StopWorkAuthority::Yes) {
        edit(store, Field::StopWorkActions, "Actions taken", r.stop_work_actions)?;
    }

    if let Some(error) = store.state().errors.get(Field::Evidence) {
        println!("   ⚠️  {}", error);
    }
    let current = r.evidence.as_ref().map(|e| e.name().to_string()).unwrap_or_default();
    let label = if current.is_empty() {
        "Evidence image path (optional, '-' to clear)".to_string()
    } else {
        format!("Evidence image path [{}] ('-' to clear)", current)
    };
    let path = prompt(&label)?;
    match path.trim() {
        "" => {}
        "-" => store.apply(FormAction::ClearEvidence),
        path => match EvidenceFile::from_path(path).await {
            Ok(file) => store.attach_evidence(file),
            Err(e) => println!("   ❌ {}", e),
        },
    }
    Ok(())
}

fn print_errors(errors: &ValidationErrors) {
    for (field, message) in errors.iter() {
        println!("   ⚠️  {}: {}", field, message);
    }
}

fn print_review(store: &FormStore) {
    let r = store.record();
    println!("\n{}", "─".repeat(60));
    println!("📋 Review");
    println!("{}", "─".repeat(60));
    println!("Type:        {}", r.unsafe_kind.map(|k| k.label()).unwrap_or("-"));
    println!("Location:    {}", r.location);
    println!("Observer:    {} ({}, {})", r.observer_name, r.position, r.company);
    if let (Some(date), Some(time)) = (r.date, r.time) {
        println!("When:        {} {}", date, time.format("%H:%M"));
    }
    println!("Rules:       {}", r.life_saving_rules.as_slice().join(", "));
    println!("Causes:      {}", r.causal_factors.as_slice().join(", "));
    println!("Stop work:   {}", r.stop_work.map(|s| s.as_str()).unwrap_or("-"));
    match &r.evidence {
        Some(Evidence::Local(file)) => println!("Evidence:    {} ({} bytes)", file.name, file.size()),
        Some(Evidence::Uploaded { name, .. }) => println!("Evidence:    {} (uploaded)", name),
        None => println!("Evidence:    none"),
    }
    println!("{}", "─".repeat(60));
}

async fn fill(store: &mut FormStore) -> Result<()> {
    loop {
        let step = store.state().current_step;
        println!("\n── Step {}/{}: {} ──", step, LAST_STEP, STEP_TITLES[usize::from(step - 1)]);
        match step {
            1 => edit_details(store)?,
            2 => edit_narrative(store)?,
            3 => {
                edit_tags(store, TagGroup::LifeSavingRules, "Life-saving rules violated")?;
                edit_tags(store, TagGroup::CausalFactors, "Causal factors")?;
            }
            _ => edit_stop_work(store).await?,
        }

        if !store.next() {
            print_errors(&store.state().errors);
            continue;
        }
        if step == LAST_STEP {
            return Ok(());
        }
        if prompt("Press Enter to continue, or 'b' to revise this step")?.trim() == "b" {
            store.back();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hoc_card=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ClientConfig::from_env();
    let api = Arc::new(HttpHocApi::new(config.backend_url.clone(), config.storage_url.clone(), config.http_timeout));
    let dispatcher = SubmissionDispatcher::new(api);

    println!("\n{}", "═".repeat(60));
    println!("🦺 Hazard Observation Card");
    println!("{}", "═".repeat(60));
    println!("Submitting to {}", config.backend_url);

    let mut store = FormStore::new();
    fill(&mut store).await?;

    loop {
        print_review(&store);
        let answer = prompt("Submit this card? (y/n/edit)")?;
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => {}
            "e" | "edit" => {
                store.set_step(1);
                fill(&mut store).await?;
                continue;
            }
            _ => {
                println!("Card discarded.");
                return Ok(());
            }
        }

        println!("⏳ Submitting...");
        match dispatcher.submit(&mut store).await {
            Ok(id) => {
                println!("\n✅ Thank you! Your HOC card was submitted (ref {}).", id);
                return Ok(());
            }
            Err(SubmissionError::Validation(errors)) => {
                print_errors(&errors);
                fill(&mut store).await?;
            }
            Err(e) => {
                println!("\n❌ {}", e);
                if !matches!(prompt("Retry? (y/n)")?.trim(), "y" | "Y" | "yes") {
                    return Ok(());
                }
            }
        }
    }
}
