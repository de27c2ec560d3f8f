mod support;

use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, sha256};

use support::{MockLightning, PAIR, test_invoice};
use swapd::config::{Config, TimeoutDeltaConfig, TimeoutDeltaMinutes};
use swapd::currency::convert_blocks;
use swapd::errors::Error;
use swapd::lightning::Route;
use swapd::swap::timeout::TimeoutDeltaProvider;
use swapd::swap::{OrderSide, SwapKind};

fn sample_config(dir: &tempfile::TempDir) -> Result<(Config, std::path::PathBuf)> {
    let path = dir.path().join("pairs.toml");
    std::fs::write(
        &path,
        r#"
[[pairs]]
base = "BTC"
quote = "BTC"
fee = 0.5
timeoutDelta = { reverse = 1440, swapMinimal = 400, swapMaximal = 1440 }

[[pairs]]
base = "L-BTC"
quote = "BTC"
fee = 0.25
timeoutDelta = 1440
"#,
    )?;
    Ok((Config::load(&path)?, path))
}

#[test]
fn converts_minutes_to_blocks_per_side() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, path) = sample_config(&dir)?;
    let provider = TimeoutDeltaProvider::new(config, path)?;

    let btc = provider.get_timeouts("BTC/BTC")?;
    assert_eq!(btc.base.reverse, 144);
    assert_eq!(btc.base.swap_minimal, 40);
    assert_eq!(btc.base.swap_maximal, 144);

    // The legacy single-integer form applies to all three deltas, converted
    // with each side's own block time.
    let lbtc = provider.get_timeouts("L-BTC/BTC")?;
    assert_eq!(lbtc.base.reverse, 1_440);
    assert_eq!(lbtc.quote.reverse, 144);

    assert!(matches!(
        provider.get_timeouts("BTC/LTC"),
        Err(Error::PairNotFound(_))
    ));
    Ok(())
}

#[test]
fn rejects_fractional_block_deltas() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pairs.toml");
    std::fs::write(
        &path,
        r#"
[[pairs]]
base = "BTC"
quote = "BTC"
fee = 0.5
timeoutDelta = 15
"#,
    )?;
    let config = Config::load(&path)?;
    let err = TimeoutDeltaProvider::new(config, path).err().context("must reject")?;
    assert_eq!(err.code(), "INVALID_TIMEOUT_BLOCK_DELTA");
    Ok(())
}

#[test]
fn convert_blocks_rounds_up() {
    assert_eq!(convert_blocks("BTC", "BTC", 10), 10);
    assert_eq!(convert_blocks("BTC", "LTC", 10), 40);
    assert_eq!(convert_blocks("LTC", "BTC", 10), 3);
    assert_eq!(convert_blocks("BTC", "L-BTC", 1), 10);
    assert_eq!(convert_blocks("BTC", "LTC", 0), 0);

    // Least integer not below the exact quotient.
    for blocks in [1u32, 7, 13, 144] {
        let converted = convert_blocks("LTC", "BTC", blocks);
        let exact = f64::from(blocks) * 2.5 / 10.0;
        assert!(f64::from(converted) >= exact);
        assert!(f64::from(converted) - exact < 1.0);
    }
}

#[test]
fn set_timeout_updates_map_and_config_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, path) = sample_config(&dir)?;
    let provider = TimeoutDeltaProvider::new(config, path.clone())?;

    let minutes = TimeoutDeltaMinutes {
        reverse: 2_880,
        swap_minimal: 200,
        swap_maximal: 2_880,
    };
    provider.set_timeout("BTC/BTC", minutes)?;

    let deltas = provider.get_timeouts("BTC/BTC")?;
    assert_eq!(deltas.base.reverse, 288);
    assert_eq!(deltas.base.swap_minimal, 20);

    // Re-reading the rewritten file yields the new values too.
    let reloaded = Config::load(&path)?;
    let pair = reloaded
        .pairs
        .iter()
        .find(|p| p.id() == "BTC/BTC")
        .context("pair missing after rewrite")?;
    assert_eq!(pair.timeout_delta, TimeoutDeltaConfig::Table(minutes));
    // Untouched pairs survive the rewrite.
    assert!(reloaded.pairs.iter().any(|p| p.id() == "L-BTC/BTC"));

    assert!(matches!(
        provider.set_timeout("BTC/LTC", minutes),
        Err(Error::PairNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn reverse_and_plain_submarine_timeouts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, path) = sample_config(&dir)?;
    let provider = TimeoutDeltaProvider::new(config, path)?;

    let (blocks, usable) = provider
        .get_timeout(PAIR, OrderSide::Buy, SwapKind::ReverseSubmarine, None, None)
        .await?;
    assert_eq!((blocks, usable), (144, false));

    let (blocks, usable) = provider
        .get_timeout(PAIR, OrderSide::Buy, SwapKind::Submarine, None, None)
        .await?;
    assert_eq!((blocks, usable), (40, true));
    Ok(())
}

#[tokio::test]
async fn invoice_timeout_follows_route_cltv() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, path) = sample_config(&dir)?;
    let provider = TimeoutDeltaProvider::new(config, path)?;

    let preimage_hash = sha256::Hash::hash(&[1u8; 32]).to_byte_array();
    let invoice = test_invoice(preimage_hash, 100_000_000);
    let decoded = swapd::lightning::invoice::decode_bolt11(&invoice)?;

    let lightning = MockLightning::new(0);

    // No routes: fall back to the maximal timeout, flagged unusable.
    let (blocks, usable) = provider
        .get_timeout(
            PAIR,
            OrderSide::Buy,
            SwapKind::Submarine,
            Some(&decoded),
            Some(&lightning as &dyn swapd::lightning::LightningClient),
        )
        .await?;
    assert_eq!((blocks, usable), (144, false));

    // A modest route fits: the minimal delta still wins.
    *lightning.routes.lock().unwrap() = vec![Route {
        total_time_lock: 30,
    }];
    let (blocks, usable) = provider
        .get_timeout(
            PAIR,
            OrderSide::Buy,
            SwapKind::Submarine,
            Some(&decoded),
            Some(&lightning as &dyn swapd::lightning::LightningClient),
        )
        .await?;
    // ceil((ceil(30 * 10) + 60) / 10) = 36 < swapMinimal of 40.
    assert_eq!((blocks, usable), (40, true));

    // A route needing 400 blocks cannot fit under the maximal of 144.
    *lightning.routes.lock().unwrap() = vec![
        Route {
            total_time_lock: 120,
        },
        Route {
            total_time_lock: 400,
        },
    ];
    let err = provider
        .get_timeout(
            PAIR,
            OrderSide::Buy,
            SwapKind::Submarine,
            Some(&decoded),
            Some(&lightning as &dyn swapd::lightning::LightningClient),
        )
        .await
        .err()
        .context("must exceed maximal")?;
    match err {
        Error::MinExpiryTooBig {
            max_minutes,
            route_minutes,
        } => {
            assert_eq!(max_minutes, 1_440);
            assert_eq!(route_minutes, 4_000);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn cltv_limit_keeps_safety_margin() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, path) = sample_config(&dir)?;
    let provider = TimeoutDeltaProvider::new(config, path)?;

    assert_eq!(provider.cltv_limit("BTC", "BTC", 40), 38);
    assert_eq!(provider.cltv_limit("L-BTC", "BTC", 100), 8);
    assert_eq!(provider.cltv_limit("BTC", "BTC", 1), 0);
    Ok(())
}
