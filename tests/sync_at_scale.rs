//! Scenario 3 from spec §8: sync an empty chain against a large,
//! sparsely-stamped remote one.

use stampchain::config::Config;
use stampchain::entities::{FinalCertificate, Hash, Header, StampingCertificate};
use stampchain::{sync, Chain};

fn build_remote(up_to: u64, b: u64, sc_probability: f64) -> Chain {
    let genesis = Header::genesis(Hash::random());
    let chain = Chain::new(
        genesis,
        Config {
            stamping_horizon: b,
            ..Config::default()
        },
    );

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

        if next.height > b && fastrand::f64() < sc_probability {
            let proof_height = next.height - b;
            let sc = StampingCertificate::new(next.height, b, headers[proof_height as usize].hash);
            // Older SCs can land below the current candidate once one has
            // already advanced it past this height; that's expected and not
            // a failure of the scenario.
            let _ = chain.add_stamping_certificate(sc);
        }
    }
    chain
}

#[test]
fn sync_catches_up_an_empty_chain_to_a_sparsely_stamped_ten_thousand_block_remote() {
    smol::future::block_on(async {
        let remote = build_remote(10_000, 20, 0.30);
        let genesis = remote.header(0).unwrap();
        let local = Chain::new(genesis, remote.config());

        let stats = sync(&local, &remote).await.unwrap();
        assert!(stats.breadcrumbs_applied > 0);

        let local_status = local.status();
        let remote_status = remote.status();
        assert_eq!(local_status, remote_status);

        for height in 0..=remote_status.height {
            assert_eq!(local.header(height), remote.header(height));
        }
        for height in 0..=remote_status.candidate {
            assert_eq!(
                local.stamping_certificate(height).is_some(),
                remote.stamping_certificate(height).is_some(),
            );
        }
    });
}
