//! CLI interface for the remediation engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{self, Config};
use crate::rules::{Condition, ContextValue, EventContext, NewRule, Operator, RuleAction, TriggerType};
use crate::service::RemediationService;
use crate::store::SqliteStore;
use crate::types::{
    Actor, ConceptId, ConceptUpdate, DifficultyTier, InteractionKind, LinkParent, NewConcept, NewInteraction,
    NewResource, Recommendation, RecommendationWithResource, Resource, ResourceFilter, ResourceKind, ResourceUpdate,
    Role, DEFAULT_LINK_WEIGHT,
};

#[derive(Parser)]
#[command(name = "remediation")]
#[command(about = "Remedial resource recommendations triggered by low grades", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "REMEDIATION_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true, env = "REMEDIATION_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send an event through the rule engine
    Event {
        /// Trigger type, e.g. grade_recorded
        trigger: String,
        /// Context fields as key=value
        fields: Vec<String>,
        /// Context as a JSON object instead of key=value pairs
        #[arg(long, conflicts_with = "fields")]
        json: Option<String>,
        /// Show per-rule action results
        #[arg(short, long)]
        detailed: bool,
    },
    /// Generate recommendations directly
    Recommend {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        task: i64,
        #[arg(long)]
        grade: f64,
    },
    /// List recommendations of a student (newest first) or of a task
    List {
        #[arg(long, required_unless_present = "task", conflicts_with = "task")]
        student: Option<i64>,
        #[arg(long)]
        task: Option<i64>,
        /// Only recommendations not yet viewed
        #[arg(short, long)]
        unseen: bool,
    },
    /// Mark a recommendation as viewed
    View {
        id: i64,
        /// Acting student
        #[arg(long)]
        actor: i64,
    },
    /// Delete one recommendation, or every recommendation of a task
    Delete {
        #[arg(required_unless_present = "task", conflicts_with = "task")]
        id: Option<i64>,
        #[arg(long, default_value = "0")]
        actor: i64,
        /// student, instructor or administrator
        #[arg(long, default_value = "student")]
        role: String,
        #[arg(long)]
        task: Option<i64>,
    },
    /// Manage concepts
    Concept {
        #[command(subcommand)]
        command: ConceptCommands,
    },
    /// Manage the resource catalog
    Resource {
        #[command(subcommand)]
        command: ResourceCommands,
    },
    /// Replace or clear the concept set of a task or resource
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },
    /// Manage rules
    Rule {
        #[command(subcommand)]
        command: RuleCommands,
    },
    /// Record or list resource interactions
    Interaction {
        #[command(subcommand)]
        command: InteractionCommands,
    },
    /// Interaction statistics of a resource
    Stats { resource: i64 },
    /// Show or change configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Set the grade threshold
        #[arg(long)]
        set_threshold: Option<f64>,
        /// Set the maximum number of recommendations
        #[arg(long)]
        set_max: Option<usize>,
        /// Set the database path
        #[arg(long)]
        set_db: Option<PathBuf>,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand)]
enum ConceptCommands {
    /// Add a concept
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tier: Option<DifficultyTier>,
    },
    /// List concepts
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Update fields of a concept
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,
        #[arg(long, conflicts_with = "clear_tier")]
        tier: Option<DifficultyTier>,
        #[arg(long)]
        clear_description: bool,
        #[arg(long)]
        clear_category: bool,
        #[arg(long)]
        clear_tier: bool,
    },
    /// Delete a concept and its links
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ResourceCommands {
    /// Add a resource
    Add {
        title: String,
        /// external_video, document, interactive_exercise, article or stored_video
        #[arg(long)]
        kind: ResourceKind,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        tier: Option<DifficultyTier>,
        /// Create as inactive
        #[arg(long)]
        inactive: bool,
    },
    /// List resources
    List {
        #[arg(long)]
        kind: Option<ResourceKind>,
        #[arg(long)]
        tier: Option<DifficultyTier>,
        /// Include inactive resources
        #[arg(short, long)]
        all: bool,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show one resource with its concept links
    Show { id: i64 },
    /// Update fields of a resource; --clear-* empties a field
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        kind: Option<ResourceKind>,
        #[arg(long, conflicts_with = "clear_url")]
        url: Option<String>,
        #[arg(long, conflicts_with = "clear_file")]
        file: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_author")]
        author: Option<String>,
        #[arg(long, conflicts_with = "clear_minutes")]
        minutes: Option<u32>,
        #[arg(long, conflicts_with = "clear_tier")]
        tier: Option<DifficultyTier>,
        #[arg(long)]
        clear_url: bool,
        #[arg(long)]
        clear_file: bool,
        #[arg(long)]
        clear_description: bool,
        #[arg(long)]
        clear_author: bool,
        #[arg(long)]
        clear_minutes: bool,
        #[arg(long)]
        clear_tier: bool,
    },
    /// Flip the active flag
    Toggle { id: i64 },
    /// Delete a resource
    Delete { id: i64 },
    /// Resources linked to concepts of the given categories
    ByCategory {
        #[arg(required = true)]
        categories: Vec<String>,
        #[arg(short, long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum LinkCommands {
    /// Link a task to concepts given as id[:weight]
    Task {
        id: i64,
        #[arg(required = true, value_parser = parse_link)]
        concepts: Vec<(ConceptId, f64)>,
    },
    /// Link a resource to concepts given as id[:weight]
    Resource {
        id: i64,
        #[arg(required = true, value_parser = parse_link)]
        concepts: Vec<(ConceptId, f64)>,
    },
    /// Remove every concept link of a task
    ClearTask { id: i64 },
    /// Remove every concept link of a resource
    ClearResource { id: i64 },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// Add a rule
    Add {
        name: String,
        /// Trigger type, e.g. grade_recorded
        #[arg(long)]
        trigger: String,
        /// Condition field; omit for an unconditional rule
        #[arg(long, requires_all = ["op", "value"])]
        field: Option<String>,
        /// One of <, >, ==, >=, <=
        #[arg(long)]
        op: Option<String>,
        #[arg(long)]
        value: Option<String>,
        /// Action type tags in execution order
        #[arg(long = "action", default_value = "CREATE_REMEDIAL_TASK")]
        actions: Vec<String>,
        #[arg(long)]
        inactive: bool,
    },
    /// List rules
    List,
    /// Activate a rule
    Enable { id: i64 },
    /// Deactivate a rule
    Disable { id: i64 },
    /// Delete a rule
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum InteractionCommands {
    /// Record an interaction
    Record {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        resource: i64,
        /// viewed, completed or rated
        #[arg(long)]
        kind: InteractionKind,
        /// 1-5 stars
        #[arg(long)]
        rating: Option<u8>,
        #[arg(long)]
        seconds: Option<u32>,
        /// The student's grade improved afterwards
        #[arg(long)]
        improved: bool,
    },
    /// List a student's interactions
    List {
        #[arg(long)]
        student: i64,
    },
}

fn parse_link(raw: &str) -> std::result::Result<(ConceptId, f64), String> {
    let (id, weight) = match raw.split_once(':') {
        Some((id, weight)) => (id, Some(weight)),
        None => (raw, None),
    };
    let id = id
        .trim()
        .parse::<ConceptId>()
        .map_err(|e| format!("invalid concept id '{}': {}", id, e))?;
    let weight = match weight {
        Some(w) => w
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid weight '{}': {}", w, e))?,
        None => DEFAULT_LINK_WEIGHT,
    };
    Ok((id, weight))
}

/// Map a setter/clear flag pair onto a nullable field update
fn nullable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config {
        show,
        set_threshold,
        set_max,
        set_db,
        reset,
    } = &cli.command
    {
        return configure(cli.config.clone(), *show, *set_threshold, *set_max, set_db.clone(), *reset);
    }

    let service = open_service(cli.config.clone(), cli.db.clone()).await?;

    match cli.command {
        Commands::Event {
            trigger,
            fields,
            json,
            detailed,
        } => {
            let context = match json {
                Some(raw) => {
                    let value: serde_json::Value = serde_json::from_str(&raw).context("Event payload is not valid JSON")?;
                    EventContext::from_json(value)?
                }
                None => EventContext::from_pairs(&fields)?,
            };

            if detailed {
                let outcomes = service.evaluate_event_detailed(&trigger, &context).await?;
                if outcomes.is_empty() {
                    println!("No rules triggered.");
                }
                for o in outcomes {
                    match &o.error {
                        None => println!("✓ {} ({} action(s))", o.rule_name, o.actions_run),
                        Some(err) => println!("✗ {} after {} action(s): {}", o.rule_name, o.actions_run, err),
                    }
                }
            } else {
                let names = service.evaluate_event(&trigger, &context).await?;
                if names.is_empty() {
                    println!("No rules triggered.");
                }
                for name in names {
                    println!("{}", name);
                }
            }
        }
        Commands::Recommend { student, task, grade } => {
            let resources = service.generate_recommendations(student, task, grade).await?;
            if resources.is_empty() {
                println!("No recommendations.");
            }
            for (i, r) in resources.iter().enumerate() {
                println!("{}. {}", i + 1, describe_resource(r));
            }
        }
        Commands::List { student, task, unseen } => match (student, task) {
            (Some(student), _) => {
                let entries = service.list_recommendations_with_resources(student, unseen).await?;
                if entries.is_empty() {
                    println!("No recommendations.");
                }
                for entry in &entries {
                    println!("{}", describe_entry(entry));
                }
            }
            (None, Some(task)) => {
                let recs: Vec<_> = service
                    .recommendations_for_task(task)
                    .await?
                    .into_iter()
                    .filter(|r| !unseen || !r.viewed)
                    .collect();
                if recs.is_empty() {
                    println!("No recommendations.");
                }
                for rec in &recs {
                    println!("{}", describe_recommendation(rec));
                }
            }
            (None, None) => anyhow::bail!("Give --student or --task"),
        },
        Commands::View { id, actor } => {
            let rec = service.mark_recommendation_viewed(id, actor).await?;
            println!("{}", describe_recommendation(&rec));
        }
        Commands::Delete { id, actor, role, task } => match (id, task) {
            (_, Some(task)) => {
                let removed = service.delete_recommendations_for_task(task).await?;
                println!("Removed {} recommendation(s) of task {}", removed, task);
            }
            (Some(id), None) => {
                let role: Role = role.parse()?;
                service.delete_recommendation(id, Actor { id: actor, role }).await?;
                println!("Recommendation {} deleted.", id);
            }
            (None, None) => anyhow::bail!("Give a recommendation id or --task"),
        },
        Commands::Concept { command } => concept_command(&service, command).await?,
        Commands::Resource { command } => resource_command(&service, command).await?,
        Commands::Link { command } => {
            let links = match command {
                LinkCommands::Task { id, concepts } => service.associate_task_concepts(id, &concepts).await?,
                LinkCommands::Resource { id, concepts } => service.associate_resource_concepts(id, &concepts).await?,
                LinkCommands::ClearTask { id } => {
                    let removed = service.clear_task_concepts(id).await?;
                    println!("Removed {} concept link(s) of {}", removed, LinkParent::Task(id));
                    return Ok(());
                }
                LinkCommands::ClearResource { id } => {
                    let removed = service.clear_resource_concepts(id).await?;
                    println!("Removed {} concept link(s) of {}", removed, LinkParent::Resource(id));
                    return Ok(());
                }
            };
            for link in links {
                println!("concept {} (weight {})", link.concept_id, link.weight);
            }
        }
        Commands::Rule { command } => rule_command(&service, command).await?,
        Commands::Interaction { command } => match command {
            InteractionCommands::Record {
                student,
                resource,
                kind,
                rating,
                seconds,
                improved,
            } => {
                let recorded = service
                    .catalog()
                    .record_interaction(NewInteraction {
                        student_id: student,
                        resource_id: resource,
                        kind,
                        rating,
                        seconds_watched: seconds,
                        improved_grade: improved,
                    })
                    .await?;
                println!("Recorded interaction {}", recorded.id);
            }
            InteractionCommands::List { student } => {
                for i in service.catalog().interactions_for_student(student).await? {
                    println!(
                        "#{} resource {} {}{} at {}",
                        i.id,
                        i.resource_id,
                        i.kind.as_str(),
                        i.rating.map(|r| format!(" ({}★)", r)).unwrap_or_default(),
                        i.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        },
        Commands::Stats { resource } => {
            let stats = service.catalog().resource_stats(resource).await?;
            println!("Resource {}", resource);
            println!("  interactions: {}", stats.total_interactions);
            println!("  views:        {}", stats.views);
            println!("  completions:  {}", stats.completions);
            println!("  ratings:      {}", stats.ratings);
            match stats.average_rating {
                Some(avg) => println!("  avg rating:   {:.2}", avg),
                None => println!("  avg rating:   -"),
            }
            println!("  improvements: {}", stats.improvements);
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn open_service(config_path: Option<PathBuf>, db: Option<PathBuf>) -> Result<RemediationService> {
    let config = match &config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let db_path = match db {
        Some(path) => path,
        None => config.storage.database_path()?,
    };

    let store = SqliteStore::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(RemediationService::new(Arc::new(store), config.engine))
}

fn configure(
    config_path: Option<PathBuf>,
    show: bool,
    set_threshold: Option<f64>,
    set_max: Option<usize>,
    set_db: Option<PathBuf>,
    reset: bool,
) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => config::config_path()?,
    };

    if reset {
        Config::default().save_to(&path)?;
        println!("Configuration reset to defaults.");
        return Ok(());
    }

    let mut config = if path.exists() {
        Config::load_from(&path)?
    } else {
        Config::default()
    };
    let changed = set_threshold.is_some() || set_max.is_some() || set_db.is_some();
    if let Some(threshold) = set_threshold {
        config.engine.grade_threshold = threshold;
    }
    if let Some(max) = set_max {
        config.engine.max_recommendations = max;
    }
    if let Some(db) = set_db {
        config.storage.database_path = Some(db);
    }

    if changed {
        config.validate()?;
        config.save_to(&path)?;
        println!("Configuration saved to {}", path.display());
    }
    if show || !changed {
        println!("# {}", path.display());
        print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
    }
    Ok(())
}

async fn concept_command(service: &RemediationService, command: ConceptCommands) -> Result<()> {
    let catalog = service.catalog();
    match command {
        ConceptCommands::Add {
            name,
            description,
            category,
            tier,
        } => {
            let concept = catalog
                .create_concept(NewConcept {
                    name,
                    description,
                    category,
                    tier,
                })
                .await?;
            println!("Created concept {} '{}'", concept.id, concept.name);
        }
        ConceptCommands::List { category } => {
            for c in catalog.list_concepts(category).await? {
                println!(
                    "{:>4}  {:<30} {:<15} {}",
                    c.id,
                    c.name,
                    c.category.as_deref().unwrap_or("-"),
                    c.tier.map(|t| t.as_str()).unwrap_or("-")
                );
            }
        }
        ConceptCommands::Update {
            id,
            name,
            description,
            category,
            tier,
            clear_description,
            clear_category,
            clear_tier,
        } => {
            let update = ConceptUpdate {
                name,
                description: nullable(description, clear_description),
                category: nullable(category, clear_category),
                tier: nullable(tier, clear_tier),
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update");
            }
            let concept = catalog.update_concept(id, update).await?;
            println!("Updated concept {} '{}'", concept.id, concept.name);
        }
        ConceptCommands::Delete { id } => {
            catalog.delete_concept(id).await?;
            println!("Concept {} deleted.", id);
        }
    }
    Ok(())
}

async fn resource_command(service: &RemediationService, command: ResourceCommands) -> Result<()> {
    let catalog = service.catalog();
    match command {
        ResourceCommands::Add {
            title,
            kind,
            url,
            file,
            description,
            author,
            minutes,
            tier,
            inactive,
        } => {
            let resource = catalog
                .create_resource(NewResource {
                    title,
                    kind,
                    url,
                    file_ref: file,
                    description,
                    author,
                    duration_minutes: minutes,
                    tier,
                    active: !inactive,
                })
                .await?;
            println!("Created {}", describe_resource(&resource));
        }
        ResourceCommands::List {
            kind,
            tier,
            all,
            limit,
            offset,
        } => {
            let filter = ResourceFilter {
                kind,
                tier,
                include_inactive: all,
                limit,
                offset,
            };
            for r in catalog.list_resources(&filter).await? {
                println!("{}", describe_resource(&r));
            }
        }
        ResourceCommands::Show { id } => {
            let resource = catalog.get_resource(id).await?;
            println!("{}", describe_resource(&resource));
            if let Some(url) = &resource.url {
                println!("  url:    {}", url);
            }
            if let Some(file) = &resource.file_ref {
                println!("  file:   {}", file);
            }
            if let Some(author) = &resource.author {
                println!("  author: {}", author);
            }
            for link in catalog.concept_links(LinkParent::Resource(id)).await? {
                println!("  concept {} (weight {})", link.concept_id, link.weight);
            }
        }
        ResourceCommands::Update {
            id,
            title,
            kind,
            url,
            file,
            description,
            author,
            minutes,
            tier,
            clear_url,
            clear_file,
            clear_description,
            clear_author,
            clear_minutes,
            clear_tier,
        } => {
            let update = ResourceUpdate {
                title,
                kind,
                url: nullable(url, clear_url),
                file_ref: nullable(file, clear_file),
                description: nullable(description, clear_description),
                author: nullable(author, clear_author),
                duration_minutes: nullable(minutes, clear_minutes),
                tier: nullable(tier, clear_tier),
                active: None,
            };
            let resource = catalog.update_resource(id, update).await?;
            println!("Updated {}", describe_resource(&resource));
        }
        ResourceCommands::Toggle { id } => {
            let resource = catalog.toggle_resource_active(id).await?;
            println!("{}", describe_resource(&resource));
        }
        ResourceCommands::Delete { id } => {
            catalog.delete_resource(id).await?;
            println!("Resource {} deleted.", id);
        }
        ResourceCommands::ByCategory { categories, all } => {
            for r in catalog.resources_by_categories(&categories, all).await? {
                println!("{}", describe_resource(&r));
            }
        }
    }
    Ok(())
}

async fn rule_command(service: &RemediationService, command: RuleCommands) -> Result<()> {
    let catalog = service.catalog();
    match command {
        RuleCommands::Add {
            name,
            trigger,
            field,
            op,
            value,
            actions,
            inactive,
        } => {
            let mut rule = NewRule::new(&name, TriggerType::from(trigger.as_str()));
            if let (Some(field), Some(op), Some(value)) = (field, op, value) {
                let value: ContextValue = value.parse()?;
                rule = rule.when(Condition::new(&field, Operator::parse(&op), value));
            }
            for tag in &actions {
                rule = rule.then(RuleAction::from_tag(tag));
            }
            if inactive {
                rule = rule.inactive();
            }
            let created = catalog.create_rule(rule).await?;
            println!("Created rule {} '{}'", created.id, created.name);
        }
        RuleCommands::List => {
            for r in catalog.list_rules().await? {
                let actions: Vec<&str> = r.actions.iter().map(|a| a.type_tag()).collect();
                println!(
                    "{:>4}  {} [{}] {} when {} -> {}",
                    r.id,
                    if r.active { "●" } else { "○" },
                    r.trigger,
                    r.name,
                    r.condition,
                    actions.join(", ")
                );
            }
        }
        RuleCommands::Enable { id } => {
            catalog.set_rule_active(id, true).await?;
            println!("Rule {} enabled.", id);
        }
        RuleCommands::Disable { id } => {
            catalog.set_rule_active(id, false).await?;
            println!("Rule {} disabled.", id);
        }
        RuleCommands::Delete { id } => {
            catalog.delete_rule(id).await?;
            println!("Rule {} deleted.", id);
        }
    }
    Ok(())
}

fn describe_resource(r: &Resource) -> String {
    format!(
        "#{} {} [{}, {}, {}]{}",
        r.id,
        r.title,
        r.kind,
        r.tier.map(|t| t.as_str()).unwrap_or("no tier"),
        r.duration_minutes
            .map(|m| format!("{} min", m))
            .unwrap_or_else(|| "? min".to_string()),
        if r.active { "" } else { " (inactive)" }
    )
}

fn describe_recommendation(rec: &Recommendation) -> String {
    format!(
        "#{} student {} task {} -> resource {} ({}) {}",
        rec.id,
        rec.student_id,
        rec.task_id,
        rec.resource_id,
        rec.created_at.format("%Y-%m-%d %H:%M"),
        match rec.viewed_at {
            Some(at) => format!("viewed {}", at.format("%Y-%m-%d %H:%M")),
            None => "unseen".to_string(),
        }
    )
}

fn describe_entry(entry: &RecommendationWithResource) -> String {
    let rec = &entry.recommendation;
    format!(
        "#{} task {} -> {} [{}] ({}) {}",
        rec.id,
        rec.task_id,
        entry.resource.title,
        entry.resource.kind,
        rec.created_at.format("%Y-%m-%d %H:%M"),
        match rec.viewed_at {
            Some(at) => format!("viewed {}", at.format("%Y-%m-%d %H:%M")),
            None => "unseen".to_string(),
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_link() {
        assert_eq!(parse_link("4").unwrap(), (4, DEFAULT_LINK_WEIGHT));
        assert_eq!(parse_link("4:0.5").unwrap(), (4, 0.5));
        assert!(parse_link("x:0.5").is_err());
        assert!(parse_link("4:heavy").is_err());
    }

    #[test]
    fn test_event_arguments() {
        let cli = Cli::try_parse_from(["remediation", "event", "grade_recorded", "grade=3.5", "student_id=9"]).unwrap();
        match cli.command {
            Commands::Event { trigger, fields, .. } => {
                assert_eq!(trigger, "grade_recorded");
                assert_eq!(fields, vec!["grade=3.5", "student_id=9"]);
            }
            _ => panic!("expected event command"),
        }
    }

    #[test]
    fn test_nullable_flags() {
        assert_eq!(nullable(Some(5u32), false), Some(Some(5)));
        assert_eq!(nullable::<u32>(None, false), None);
        assert_eq!(nullable::<u32>(None, true), Some(None));
    }

    #[test]
    fn test_resource_clear_flags() {
        let cli = Cli::try_parse_from(["remediation", "resource", "update", "3", "--clear-tier", "--minutes", "15"]).unwrap();
        match cli.command {
            Commands::Resource {
                command:
                    ResourceCommands::Update {
                        id,
                        tier,
                        clear_tier,
                        minutes,
                        clear_minutes,
                        ..
                    },
            } => {
                assert_eq!(id, 3);
                assert_eq!(nullable(tier, clear_tier), Some(None));
                assert_eq!(nullable(minutes, clear_minutes), Some(Some(15)));
            }
            _ => panic!("expected resource update"),
        }

        let clash = Cli::try_parse_from(["remediation", "resource", "update", "3", "--url", "https://x", "--clear-url"]);
        assert!(clash.is_err());
    }

    #[test]
    fn test_link_clear_and_concept_update_arguments() {
        let cli = Cli::try_parse_from(["remediation", "link", "clear-task", "100"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Link {
                command: LinkCommands::ClearTask { id: 100 }
            }
        ));

        let cli = Cli::try_parse_from(["remediation", "concept", "update", "2", "--name", "Ratios", "--clear-category"])
            .unwrap();
        match cli.command {
            Commands::Concept {
                command: ConceptCommands::Update {
                    name, clear_category, ..
                },
            } => {
                assert_eq!(name.as_deref(), Some("Ratios"));
                assert!(clear_category);
            }
            _ => panic!("expected concept update"),
        }
    }
}
