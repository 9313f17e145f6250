//! tamp CLI: closed-loop block-world task and motion planning.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use tamp_bridge::abstraction::WorldAbstractor;
use tamp_bridge::config::BridgeConfig;
use tamp_bridge::controller::ExecutionController;
use tamp_bridge::goal::Goal;
use tamp_bridge::pddl::ProblemEmitter;
use tamp_bridge::plan::parse_plan;
use tamp_bridge::planner::ExternalPlanner;
use tamp_bridge::predicate::WorldModel;
use tamp_bridge::robot::observe;
use tamp_bridge::scene::SceneLayout;
use tamp_bridge::sim::KinematicSim;

#[derive(Parser)]
#[command(name = "tamp", version, about = "Closed-loop task and motion planning for block worlds")]
struct Cli {
    /// TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SceneArgs {
    /// Scene preset (six-blocks, stacked, special-1, special-2) or a .toml layout.
    #[arg(long, default_value = "six-blocks")]
    scene: String,

    /// Seed for preset placement noise.
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Ground a scene and print its World Model.
    Abstract {
        #[command(flatten)]
        scene: SceneArgs,

        /// Print the predicates as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ground a scene and write the planner problem description.
    Emit {
        #[command(flatten)]
        scene: SceneArgs,

        /// Goal preset (tower, rainbow) or a conjunction like "(on r g) (on b r)".
        #[arg(long, default_value = "tower")]
        goal: String,

        /// Output path. Printed to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Parse a planner solution file and print the grounded actions.
    ParsePlan {
        /// Solution file, e.g. actions.soln.
        file: PathBuf,
    },

    /// Run the closed loop on the kinematic sim until the plan runs dry.
    Run {
        #[command(flatten)]
        scene: SceneArgs,

        /// Goal preset (tower, rainbow) or a conjunction.
        #[arg(long, default_value = "tower")]
        goal: String,

        /// Directory for problem and plan files.
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Abort after this many cycles.
        #[arg(long)]
        max_cycles: Option<usize>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Config file management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config.
    Init {
        /// Target path.
        #[arg(long, default_value = "tamp.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config.
    Show,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Abstract { scene, json } => {
            let layout = SceneLayout::resolve(&scene.scene, scene.seed)?;
            let model = ground(&layout, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&model).into_diagnostic()?);
            } else {
                for fact in &model {
                    println!("{fact}");
                }
            }
        }

        Commands::Emit { scene, goal, out } => {
            let layout = SceneLayout::resolve(&scene.scene, scene.seed)?;
            let goal = Goal::resolve(&goal)?;
            let model = ground(&layout, &config)?;
            let emitter = ProblemEmitter::new(config.pddl.clone());
            match out {
                Some(path) => {
                    emitter.write(&path, &model, layout.block_ids(), layout.slot_ids(), &goal)?;
                    println!("Wrote {}", path.display());
                }
                None => {
                    print!("{}", emitter.render(&model, layout.block_ids(), layout.slot_ids(), &goal));
                }
            }
        }

        Commands::ParsePlan { file } => {
            let text = std::fs::read_to_string(&file).into_diagnostic()?;
            let plan = parse_plan(&text)?;
            if plan.is_empty() {
                println!("(empty plan)");
            }
            for (i, action) in plan.iter().enumerate() {
                println!("{:>3}  {action}", i + 1);
            }
        }

        Commands::Run {
            scene,
            goal,
            workdir,
            max_cycles,
            json,
        } => {
            let mut config = config;
            if let Some(dir) = workdir {
                config.controller.workdir = dir;
            }
            if max_cycles.is_some() {
                config.controller.max_cycles = max_cycles;
            }
            config.validate()?;
            std::fs::create_dir_all(&config.controller.workdir).into_diagnostic()?;

            let layout = SceneLayout::resolve(&scene.scene, scene.seed)?;
            let goal = Goal::resolve(&goal)?;
            let robot = KinematicSim::with_config(&layout, config.sim.clone());
            let planner = ExternalPlanner::new(&config.planner);
            let mut controller = ExecutionController::new(robot, planner, layout, goal, &config);
            let report = controller.run()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            } else {
                for record in &report.cycles {
                    let action = record
                        .action
                        .as_ref()
                        .map_or_else(|| "(done)".to_string(), ToString::to_string);
                    println!(
                        "cycle {:>3}: {:>2} facts, plan length {:>2}, {action}",
                        record.cycle, record.facts, record.plan_len
                    );
                }
                println!(
                    "{} step(s) executed, goal {}",
                    report.steps_executed,
                    if report.goal_satisfied { "reached" } else { "not reached" }
                );
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => init_config(&path, force)?,
            ConfigAction::Show => print!("{}", config.to_toml()?),
        },
    }

    Ok(())
}

/// Build the scene on the sim and ground its initial state.
fn ground(layout: &SceneLayout, config: &BridgeConfig) -> Result<WorldModel> {
    let sim = KinematicSim::with_config(layout, config.sim.clone());
    let (snapshot, observation) = observe(&sim, layout)?;
    let abstractor = WorldAbstractor::new(config.thresholds.clone(), config.abstraction.policy);
    Ok(abstractor.abstract_world(&snapshot, &observation)?)
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        miette::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    BridgeConfig::default().save(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
