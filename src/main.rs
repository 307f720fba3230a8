//! kompose-chart - Docker Compose to Helm chart translator
//!
//! This is the CLI entry point.

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use kompose_chart::compose::{ComposeParser, Project};
use kompose_chart::release::{
    release_name, Context, HelmCli, HelmSettings, MemoryReleaseManager, ReleaseDriver,
    ReleaseManager, StackSummary,
};
use kompose_chart::ChartAssembler;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// kompose-chart - Compose projects as Helm charts
#[derive(Parser)]
#[command(name = "kompose-chart")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Translate Compose projects into Helm charts and releases", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the Compose project comes from
#[derive(Args)]
struct ProjectArgs {
    /// Compose file (repeat to merge overrides)
    #[arg(short, long)]
    file: Vec<PathBuf>,
    /// Project name
    #[arg(short, long)]
    project_name: Option<String>,
    /// Chart version
    #[arg(long, default_value = kompose_chart::chart::DEFAULT_CHART_VERSION)]
    chart_version: String,
}

/// Release manager connection
#[derive(Args)]
struct HelmArgs {
    /// Target namespace
    #[arg(short, long, env = "HELM_NAMESPACE")]
    namespace: Option<String>,
    /// Kubeconfig context
    #[arg(long, env = "HELM_KUBECONTEXT")]
    kube_context: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the chart to the directory derived from a path
    Convert {
        #[command(flatten)]
        project: ProjectArgs,
        /// Output path; `out/web.tgz` and `out/charts` both write to `out/`
        #[arg(short, long, default_value = "./")]
        output: PathBuf,
    },

    /// Print the chart's manifests
    Render {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Package the chart as a .tgz archive
    Package {
        #[command(flatten)]
        project: ProjectArgs,
        /// Destination directory
        #[arg(short = 'D', long, default_value = ".")]
        destination: PathBuf,
    },

    /// Install or upgrade the project as a release
    Install {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        helm: HelmArgs,
        /// Assemble and print the chart without contacting the cluster
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a release
    Uninstall {
        /// Release (project) name
        name: String,
        #[command(flatten)]
        helm: HelmArgs,
    },

    /// List releases
    #[command(alias = "list")]
    Ls {
        /// Only show this project
        #[arg(long)]
        project: Option<String>,
        #[command(flatten)]
        helm: HelmArgs,
    },
}

fn load_project(args: &ProjectArgs) -> anyhow::Result<Project> {
    let files = if args.file.is_empty() {
        let working_dir = std::env::current_dir()?;
        let found = ComposeParser::find_compose_file(&working_dir).with_context(|| {
            format!("no compose file found in {}", working_dir.display())
        })?;
        vec![found]
    } else {
        args.file.clone()
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    let project = ComposeParser::load_project(&files, args.project_name.as_deref(), &env)?;
    Ok(project)
}

fn settings(args: &HelmArgs) -> HelmSettings {
    let mut settings = HelmSettings::from_env();
    if let Some(namespace) = &args.namespace {
        settings = settings.with_namespace(namespace);
    }
    if let Some(context) = &args.kube_context {
        settings = settings.with_kube_context(context);
    }
    settings
}

fn helm_driver(args: &HelmArgs) -> ReleaseDriver<HelmCli> {
    let settings = settings(args);
    ReleaseDriver::with_settings(HelmCli::new(settings.clone()), settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Convert { project, output } => {
            let assembler = ChartAssembler::new().with_version(&project.chart_version);
            let mut compose = load_project(&project)?;
            let dir = assembler.generate_chart(&mut compose, &output)?;
            println!("{}", dir.display());
        }

        Commands::Render { project } => {
            let assembler = ChartAssembler::new().with_version(&project.chart_version);
            let mut compose = load_project(&project)?;
            let chart = assembler.assemble(&mut compose)?;
            print!("{}", chart.render()?);
        }

        Commands::Package {
            project,
            destination,
        } => {
            let assembler = ChartAssembler::new().with_version(&project.chart_version);
            let mut compose = load_project(&project)?;
            let chart = assembler.assemble(&mut compose)?;
            let archive = chart.package(&destination)?;
            println!("{}", archive.display());
        }

        Commands::Install {
            project,
            helm,
            dry_run,
        } => {
            let assembler = ChartAssembler::new().with_version(&project.chart_version);
            let mut compose = load_project(&project)?;
            let ctx = Context::new();

            if dry_run {
                let settings = settings(&helm);
                let manager = MemoryReleaseManager::new(&settings.namespace);
                let driver =
                    ReleaseDriver::with_settings(manager, settings).with_assembler(assembler);
                driver.connect(&ctx).await?;
                driver.install(&mut compose).await?;

                let releases = driver.manager().list_releases().await?;
                for release in &releases {
                    if let Some(chart) = driver.manager().chart(&release.name)? {
                        print!("{}", chart.render()?);
                    }
                }
            } else {
                let driver = helm_driver(&helm).with_assembler(assembler);
                driver.connect(&ctx).await?;
                driver.install(&mut compose).await?;
                println!("Installed {}", release_name(&compose.name));
            }
        }

        Commands::Uninstall { name, helm } => {
            let driver = helm_driver(&helm);
            driver.connect(&Context::new()).await?;
            driver
                .uninstall(&name)
                .await
                .with_context(|| format!("failed to uninstall {}", name))?;
            println!("Uninstalled {}", release_name(&name));
        }

        Commands::Ls { project, helm } => {
            let driver = helm_driver(&helm);
            driver.connect(&Context::new()).await?;

            let mut stacks = driver.list(project.as_deref().unwrap_or_default()).await?;
            if let Some(project) = &project {
                stacks = StackSummary::filter_by_project(stacks, project);
            }

            println!("{:<30} {:<10} REASON", "NAME", "STATUS");
            for stack in stacks {
                println!(
                    "{:<30} {:<10} {}",
                    stack.name,
                    stack.status.to_string(),
                    stack.reason.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
