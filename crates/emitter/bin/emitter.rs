use anyhow::Result;
use clap::Parser;
use emitter::{Emitter, IterationLimit, RawSocketTransmitter};
use env_logger::Env;
use log::info;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};

/// Repeatedly sends an IGMP query to 224.0.0.1 and an ICMPv6 echo request
/// to 2001:db8:85a3::8a2e:370:7334. Requires raw socket privileges.
#[derive(Parser, Debug)]
#[command(version, about)]
struct EmitterArgs {
    /// Number of iterations to run, forever if omitted
    #[arg(short, long)]
    count: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = EmitterArgs::parse();

    let mut emitter = Emitter::new(RawSocketTransmitter::new());
    for signal in [SIGINT, SIGTERM, SIGQUIT] {
        signal_hook::flag::register(signal, emitter.stop_handle())?;
    }

    let limit = args
        .count
        .map(IterationLimit::Count)
        .unwrap_or_default();
    let stats = emitter.run(limit).await?;
    info!("sent {}", stats);
    Ok(())
}
