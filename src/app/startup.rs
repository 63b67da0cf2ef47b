use std::io::IsTerminal;

use clap::{CommandFactory, FromArgMatches};

use crate::app::args::Args;
use crate::app::demo::{self, DemoPlan};
use crate::app::display;
use crate::core::config::MessagingConfig;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use crate::core::styles::palette_to_clap;

/// Parse arguments, load configuration and logging, then run the demo
pub fn startup() {
    let help_color = std::io::stdout().is_terminal();
    let matches = Args::command()
        .styles(palette_to_clap(help_color))
        .get_matches();
    let args = match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };
    let use_color = args.use_color();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            start_logging(&MessagingConfig::default(), use_color);
            log_error_with_context(&e, "Loading configuration");
            std::process::exit(1);
        }
    };
    start_logging(&config, use_color);
    log::info!(
        "gridmq {} starting with {} partitions",
        env!("CARGO_PKG_VERSION"),
        config.partition_count
    );
    log::debug!("Effective configuration: {:#?}", config);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("FATAL: could not start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let plan = plan_from_args(&args);
    let report = match runtime.block_on(demo::run(config, &plan)) {
        Ok(report) => report,
        Err(e) => {
            log_error_with_context(&e, "Running the messaging demo");
            std::process::exit(1);
        }
    };

    if args.json {
        match display::report_json(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                log::error!("FATAL: could not serialize the report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        display::print_report(&report, use_color);
    }
}

/// Configuration file (explicit, then default location) with command line overrides
pub fn load_config(args: &Args) -> Result<MessagingConfig, crate::core::config::ConfigError> {
    let mut config = MessagingConfig::discover(args.config_file.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

pub fn plan_from_args(args: &Args) -> DemoPlan {
    DemoPlan {
        messages: args.messages,
        topic_subscribers: args.topic_subscribers,
        queue_workers: args.queue_workers,
        transfer: args.transfer,
        ..DemoPlan::default()
    }
}

fn start_logging(config: &MessagingConfig, use_color: bool) {
    let logging = &config.logging;
    if let Err(e) = init_logging(
        Some(logging.level.as_str()),
        Some(logging.format.as_str()),
        logging.file.as_deref(),
        use_color,
    ) {
        eprintln!("Warning: could not initialise logging: {}", e);
    }
}
