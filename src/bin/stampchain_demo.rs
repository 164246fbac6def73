//! Small CLI front-end wiring a `Chain` together with an in-process peer,
//! to demonstrate config plumbing end to end. Not a production node: no
//! persistence, no real transport.

use structopt::StructOpt;

use stampchain::config::{Config, DEFAULT_STAMPING_HORIZON};
use stampchain::entities::Header;
use stampchain::{sync, Chain};

#[derive(Debug, StructOpt)]
#[structopt(name = "stampchain-demo")]
struct Args {
    /// Stamping horizon `B`: distance between a stamping certificate and
    /// the header it retroactively stamps.
    #[structopt(long, default_value = "20")]
    stamping_horizon: u64,

    /// Number of blocks to grow the demo chain to before syncing a second,
    /// empty chain against it.
    #[structopt(long, default_value = "100")]
    blocks: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::from_args();

    let config = Config {
        stamping_horizon: args.stamping_horizon.max(1),
        ..Config::default()
    };
    log::info!(
        "starting demo chain with stamping_horizon={} (default {})",
        config.stamping_horizon,
        DEFAULT_STAMPING_HORIZON
    );

    let genesis = Header::genesis(stampchain::Hash::random());
    let remote = Chain::new(genesis, config);

    let mut tip = genesis;
    for _ in 1..=args.blocks {
        let next = Header::child_of(&tip, stampchain::Hash::random());
        remote.add_block(next, None)?;
        tip = next;

        if next.height > config.stamping_horizon
            && next.height % config.stamping_horizon == 0
        {
            let proof_height = next.height - config.stamping_horizon;
            let proof_header = remote
                .header(proof_height)
                .expect("proof height is within the chain we just built");
            let sc = stampchain::StampingCertificate::new(
                next.height,
                config.stamping_horizon,
                proof_header.hash,
            );
            remote.add_stamping_certificate(sc)?;
        }
    }
    log::info!("remote chain built: {}", remote.dump());

    let local = Chain::new(genesis, config);
    smolscale::block_on(async {
        let stats = sync(&local, &remote).await?;
        log::info!(
            "sync complete: {} breadcrumbs, {} bare headers fetched",
            stats.breadcrumbs_applied,
            stats.headers_fetched
        );
        anyhow::Ok(())
    })?;

    log::info!("local chain after sync: {}", local.dump());
    Ok(())
}
