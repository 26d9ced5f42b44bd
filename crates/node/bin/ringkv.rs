use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ringkv_node::config::Config;
use ringkv_node::config::DEFAULT_CONFIG_LOCATION;
use ringkv_node::logging::init_logging;
use ringkv_node::logging::LogLevel;
use ringkv_node::scenario::Scenario;
use ringkv_node::util::build_version;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a default configuration file.")]
    Init(InitCommand),
    #[command(about = "Runs a scripted scenario on an in-process ring.")]
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = DEFAULT_CONFIG_LOCATION,
        help = "The location of config file"
    )]
    pub location: String,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(long, short = 's', value_enum, default_value_t = Scenario::Basic, env)]
    pub scenario: Scenario,

    #[arg(
        long,
        short = 'c',
        env,
        help = "Config file location. If not provided, use the defaults"
    )]
    pub config: Option<String>,
}

async fn run(args: RunCommand) -> anyhow::Result<()> {
    let config = match args.config {
        Some(path) => Config::read_fs(path)?,
        None => Config::default(),
    };
    let report = args.scenario.run(config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed: Vec<&str> = report
        .steps
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(step, _)| step.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("scenario {} failed at: {}", args.scenario, failed.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    tracing::debug!("ringkv {}", build_version());

    match cli.command {
        Command::Init(args) => {
            let config = Config {
                log_level: cli.log_level,
                ..Config::default()
            };
            let path = config.write_fs(args.location.as_str())?;
            println!("Your config file has saved to: {}", path);
            Ok(())
        }
        Command::Run(args) => run(args).await,
    }
}
