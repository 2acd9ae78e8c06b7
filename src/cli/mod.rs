//! CLI subcommands: init, validate, diets, canonicalize, plan.

use crate::audit::hasher;
use crate::core::knowledge::KnowledgeBase;
use crate::core::parser;
use crate::core::planner::{self, PlanOptions};
use crate::core::types::{join_diets, SubstitutionPlan};
use clap::Subcommand;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the built-in knowledge base and an example recipe
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Load and validate a knowledge base
    Validate {
        /// Knowledge base file (default: built-in)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },

    /// List diets and the size of their forbidden sets
    Diets {
        /// Knowledge base file (default: built-in)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },

    /// Show how ingredient names canonicalize
    Canonicalize {
        /// Raw ingredient names
        #[arg(required = true)]
        names: Vec<String>,

        /// Knowledge base file (default: built-in)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },

    /// Build a substitution plan for a recipe
    Plan {
        /// Recipe file
        #[arg(short, long, default_value = "recipe.yaml")]
        recipe: PathBuf,

        /// Active diet, highest priority first (repeatable)
        #[arg(short, long = "diet", required = true)]
        diets: Vec<String>,

        /// Knowledge base file (default: built-in)
        #[arg(short, long)]
        knowledge: Option<PathBuf>,

        /// Override the knowledge base's chaining bound
        #[arg(long)]
        max_chain_depth: Option<usize>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        /// Fail unless the plan digest matches
        #[arg(long)]
        expect_digest: Option<String>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { knowledge } => cmd_validate(knowledge.as_deref()),
        Commands::Diets { knowledge } => cmd_diets(knowledge.as_deref()),
        Commands::Canonicalize { names, knowledge } => {
            cmd_canonicalize(&names, knowledge.as_deref())
        }
        Commands::Plan {
            recipe,
            diets,
            knowledge,
            max_chain_depth,
            json,
            expect_digest,
        } => cmd_plan(&PlanArgs {
            recipe: &recipe,
            diets: &diets,
            knowledge: knowledge.as_deref(),
            max_chain_depth,
            json,
            expect_digest: expect_digest.as_deref(),
        }),
    }
}

const EXAMPLE_RECIPE: &str = r#"title: Buttermilk Pancakes
servings: 4
ingredients:
  - { quantity: "1 1/2", unit: cups, name: all-purpose flour }
  - { quantity: 2, unit: tbsp, name: sugar }
  - { quantity: 2, unit: tsp, name: baking powder }
  - { quantity: "1/2", unit: tsp, name: salt }
  - { quantity: 2, name: large eggs }
  - { quantity: "1 1/4", unit: cups, name: whole milk }
  - { quantity: 3, unit: tbsp, name: "butter, melted" }
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let knowledge_path = path.join("knowledge.yaml");
    let recipe_path = path.join("recipe.yaml");
    for p in [&knowledge_path, &recipe_path] {
        if p.exists() {
            return Err(format!("{} already exists", p.display()));
        }
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    std::fs::write(&knowledge_path, KnowledgeBase::builtin_source())
        .map_err(|e| format!("cannot write {}: {}", knowledge_path.display(), e))?;
    std::fs::write(&recipe_path, EXAMPLE_RECIPE)
        .map_err(|e| format!("cannot write {}: {}", recipe_path.display(), e))?;

    println!("Initialized larder project at {}", path.display());
    println!("  Created: {}", knowledge_path.display());
    println!("  Created: {}", recipe_path.display());
    Ok(())
}

/// Load a knowledge base from a file, or the built-in one.
fn load_knowledge(path: Option<&Path>) -> Result<KnowledgeBase, String> {
    match path {
        Some(p) => KnowledgeBase::load(p).map_err(|e| e.to_string()),
        None => KnowledgeBase::builtin().map_err(|e| e.to_string()),
    }
}

fn cmd_validate(path: Option<&Path>) -> Result<(), String> {
    let kb = match path {
        Some(p) => {
            let config = parser::parse_knowledge_file(p).map_err(|e| e.to_string())?;
            let errors = parser::validate_knowledge(&config);
            if !errors.is_empty() {
                for e in &errors {
                    eprintln!("  ERROR: {}", e);
                }
                return Err(format!("{} validation error(s)", errors.len()));
            }
            KnowledgeBase::from_config(&config).map_err(|e| e.to_string())?
        }
        None => load_knowledge(None)?,
    };

    let options: usize = kb.diets().map(|d| d.option_count()).sum();
    println!(
        "OK: {} ({} ingredients, {} diets, {} options)",
        kb.name(),
        kb.ingredients().count(),
        kb.diets().count(),
        options
    );
    println!("Fingerprint: {}", kb.fingerprint());
    Ok(())
}

fn cmd_diets(path: Option<&Path>) -> Result<(), String> {
    let kb = load_knowledge(path)?;
    for diet in kb.diets() {
        println!(
            "{:<12} {:<14} {:>3} forbidden, {:>3} options",
            diet.id.as_str(),
            diet.name,
            diet.forbidden_count(),
            diet.option_count()
        );
        if let Some(desc) = &diet.description {
            println!("             {}", desc);
        }
    }
    Ok(())
}

fn cmd_canonicalize(names: &[String], path: Option<&Path>) -> Result<(), String> {
    let kb = load_knowledge(path)?;
    for raw in names {
        let c = kb.canonicalize(raw);
        let qualifier = c
            .qualifier
            .as_deref()
            .map(|q| format!(" [{}]", q))
            .unwrap_or_default();
        println!(
            "{} -> {} ({}, {}){}",
            raw, c.ingredient.id, c.ingredient.name, c.kind, qualifier
        );
    }
    Ok(())
}

struct PlanArgs<'a> {
    recipe: &'a Path,
    diets: &'a [String],
    knowledge: Option<&'a Path>,
    max_chain_depth: Option<usize>,
    json: bool,
    expect_digest: Option<&'a str>,
}

fn cmd_plan(args: &PlanArgs<'_>) -> Result<(), String> {
    let kb = load_knowledge(args.knowledge)?;
    let recipe = parser::parse_recipe_file(args.recipe).map_err(|e| e.to_string())?;
    let options = PlanOptions {
        max_chain_depth: args.max_chain_depth,
    };
    let plan = planner::plan_substitutions(&kb, &recipe, args.diets, &options)
        .map_err(|e| e.to_string())?;

    let digest = match args.expect_digest {
        Some(expected) => hasher::verify_plan_digest(&plan, expected)?,
        None => hasher::plan_digest(&plan)?,
    };

    if args.json {
        let out = serde_json::json!({ "digest": digest, "plan": plan });
        let text =
            serde_json::to_string_pretty(&out).map_err(|e| format!("JSON error: {}", e))?;
        println!("{}", text);
    } else {
        print!("{}", render_plan(&plan));
        println!("Digest: {}", digest);
    }
    Ok(())
}

/// Render a plan as text, one entry per recipe line in recipe order.
pub fn render_plan(plan: &SubstitutionPlan) -> String {
    let mut entries: Vec<(usize, String)> = Vec::new();

    for d in &plan.decisions {
        let mut entry = String::new();
        match &d.substitute {
            Some(sub) => {
                let strategy = d.strategy.map(|s| s.to_string()).unwrap_or_default();
                let _ = writeln!(
                    entry,
                    "  ~ {} {} -> {} {} [{}, confidence {:.2}]",
                    d.original.quantity,
                    d.original.ingredient.name,
                    d.quantity,
                    sub.name,
                    strategy,
                    d.confidence
                );
            }
            None => {
                let _ = writeln!(
                    entry,
                    "  ! {} {} kept (conflict: {})",
                    d.original.quantity,
                    d.original.ingredient.name,
                    join_diets(&d.diets)
                );
            }
        }
        let _ = writeln!(entry, "      {}", d.rationale);
        entries.push((d.line, entry));
    }
    for u in &plan.unchanged {
        entries.push((
            u.line,
            format!("    {} {}\n", u.ingredient.quantity, u.ingredient.ingredient.name),
        ));
    }
    entries.sort_by_key(|(line, _)| *line);

    let mut out = String::new();
    let servings = plan
        .servings
        .map(|s| format!(" (serves {})", s))
        .unwrap_or_default();
    let _ = writeln!(out, "Planning: {}{} for {}", plan.title, servings, join_diets(&plan.diets));
    let _ = writeln!(
        out,
        "Knowledge: {} ({})",
        plan.knowledge.name, plan.knowledge.fingerprint
    );
    out.push('\n');
    for (_, entry) in &entries {
        out.push_str(entry);
    }

    if !plan.warnings.is_empty() {
        out.push('\n');
        out.push_str("Warnings:\n");
        for w in &plan.warnings {
            let _ = writeln!(out, "  {}", w);
        }
    }
    if !plan.unresolved.is_empty() {
        out.push('\n');
        out.push_str("Unresolved:\n");
        for c in &plan.unresolved {
            let _ = writeln!(out, "  line {}: {} ({}): {}", c.line + 1, c.raw, c.reason, c.detail);
        }
    }

    out.push('\n');
    let s = &plan.summary;
    let _ = writeln!(
        out,
        "Plan: {} substituted, {} unchanged, {} unresolved, {} warning(s).",
        s.substituted, s.unchanged, s.unresolved, s.warnings
    );
    out
}
