//! Exercises the sync engine's `BreadcrumbSource` impl for `Peer`: a local
//! empty chain catches up against a remote chain over a real (in-process)
//! transport, with the remote side answering `GetBreadcrumb`/`GetHeaders`
//! straight out of its own `Chain`.

use stampchain::config::Config;
use stampchain::entities::{FinalCertificate, Hash, Header, StampingCertificate};
use stampchain::wire::HandshakeData;
use stampchain::{sync, Chain, Peer};

fn build_chain_with_scs(up_to: u64, sc_heights: &[u64], config: Config) -> Chain {
    let genesis = Header::genesis(Hash::random());
    let chain = Chain::new(genesis, config);
    let mut headers = vec![genesis];
    for _ in 1..=up_to {
        let next = Header::child_of(headers.last().unwrap(), Hash::random());
        chain
            .add_block(
                next,
                Some(FinalCertificate {
                    height: next.height,
                    parent_hash: next.parent_hash,
                }),
            )
            .unwrap();
        headers.push(next);
    }
    for &height in sc_heights {
        let proof_height = height - config.stamping_horizon;
        let sc = StampingCertificate::new(
            height,
            config.stamping_horizon,
            headers[proof_height as usize].hash,
        );
        chain.add_stamping_certificate(sc).unwrap();
    }
    chain
}

#[test]
fn local_chain_syncs_against_a_peer_over_a_live_connection() {
    smol::future::block_on(async {
        let config = Config {
            stamping_horizon: 20,
            ..Config::default()
        };
        let remote_chain = build_chain_with_scs(100, &[25, 50, 75, 100], config);
        let genesis = remote_chain.header(0).unwrap();
        let local_chain = Chain::new(genesis, config);

        let (local_conn, remote_conn) = smol::net::unix::UnixStream::pair().unwrap();

        // The remote side's peer object answers requests out of the chain
        // that actually has the data; the local side's peer object is only
        // ever the requester here, so its serving chain is irrelevant. Both
        // handshakes must run concurrently — each blocks on reading the
        // other's Handshake frame before returning.
        let remote_status = remote_chain.status();
        let (local_res, remote_res) = smol::future::zip(
            Peer::handshake(
                "remote".to_string(),
                local_conn,
                config,
                local_chain.clone(),
                HandshakeData {
                    version: config.version,
                    network_id: config.network_id,
                    genesis: genesis.hash,
                    sc_status: Default::default(),
                },
            ),
            Peer::handshake(
                "local".to_string(),
                remote_conn,
                config,
                remote_chain.clone(),
                HandshakeData {
                    version: config.version,
                    network_id: config.network_id,
                    genesis: genesis.hash,
                    sc_status: remote_status,
                },
            ),
        )
        .await;

        let (local_view_of_remote, _la, _lb) = local_res.unwrap();
        let (_remote_view_of_local, _ra, _rb) = remote_res.unwrap();

        assert_eq!(local_view_of_remote.status(), remote_status);

        let stats = sync(&local_chain, local_view_of_remote.as_ref())
            .await
            .unwrap();
        assert!(stats.breadcrumbs_applied > 0);

        let local_status = local_chain.status();
        assert_eq!(local_status, remote_status);
        for height in 0..=remote_status.height {
            assert_eq!(local_chain.header(height), remote_chain.header(height));
        }
    });
}
