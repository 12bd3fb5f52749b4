//! main - checks an SMF configuration and shows the user plane paths it gives

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use hex::FromHex;
use slog::{Drain, Logger, info, o, warn};
use smf::{Config, Snssai, UpfRegistry, UpfSelectionParams, UserPlaneTopology};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SMF configuration file (TOML).
    #[arg(long, default_value = "smf.toml")]
    config: String,

    /// Slice and DNN to select a path for, as <sst>[-<sd>]:<dnn>, for example 1-010203:internet.
    /// May be repeated.  Defaults to every slice and DNN served by a UPF.
    #[arg(long)]
    query: Vec<String>,
}

fn main() -> Result<()> {
    exit_on_panic();
    let logger = init_logging();
    let args = Args::parse();

    let config = smf::load_config_file(&args.config, &logger)?;
    let upfs = UpfRegistry::default();
    let topology = UserPlaneTopology::build_from_config(&config.user_plane, &upfs, &logger)?;

    let queries = match args.query.is_empty() {
        true => configured_queries(&config),
        false => args
            .query
            .iter()
            .map(|q| parse_query(q))
            .collect::<Result<Vec<_>>>()?,
    };
    for (snssai, dnn) in queries {
        show_selection(&topology, UpfSelectionParams::new(snssai, &dnn), &logger);
    }
    Ok(())
}

fn show_selection(topology: &UserPlaneTopology, params: UpfSelectionParams, logger: &Logger) {
    match topology.select_path(&params) {
        Ok(path) => info!(logger, "{}: default path {:?}", params, topology.names(&path)),
        Err(e) => warn!(logger, "{}: {}", params, e),
    }
    let candidates = topology.select_anchor_candidates(topology.access_node(), &params);
    info!(
        logger,
        "{}: anchor candidates {:?}",
        params,
        topology.names(&candidates)
    );
}

fn configured_queries(config: &Config) -> Vec<(Snssai, String)> {
    let mut queries = vec![];
    for node in config.user_plane.nodes.iter() {
        for slice in node.snssai_infos.iter() {
            for dnn in slice.dnn_infos.iter() {
                let query = (slice.snssai, dnn.dnn.clone());
                if !queries.contains(&query) {
                    queries.push(query);
                }
            }
        }
    }
    queries
}

fn parse_query(query: &str) -> Result<(Snssai, String)> {
    let (slice, dnn) = query
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected <sst>[-<sd>]:<dnn>, got {query}"))?;
    let (sst, sd) = match slice.split_once('-') {
        Some((sst, sd)) => (sst, Some(<[u8; 3]>::from_hex(sd).context("Bad SD")?)),
        None => (slice, None),
    };
    let sst = sst.parse::<u8>().context("Bad SST")?;
    Ok((Snssai::new(sst, sd), dnn.to_string()))
}

fn init_logging() -> Logger {
    // Use info level logging by default
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info") }
    }
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}
