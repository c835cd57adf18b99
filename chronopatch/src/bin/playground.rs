use anyhow::Result;
use chrono::{TimeZone, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use chronopatch::{Chain, Direction, FuturePolicy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Tariff {
    price_cents: i64,
    label: String,
}

fn tariff(price_cents: i64, label: &str) -> Tariff {
    Tariff {
        price_cents,
        label: label.to_string(),
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .target(env_logger::Target::Stdout)
        .init();

    let initial = tariff(1000, "base");
    let mut chain = Chain::new(Direction::Forward);

    chain.add(
        &initial,
        &tariff(1250, "spring"),
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        None,
    )?;
    chain.add(
        &initial,
        &tariff(1400, "summer"),
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        None,
    )?;
    // A late correction in front of the summer tariff, keeping it intact.
    chain.add(
        &initial,
        &tariff(1100, "promo"),
        Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap(),
        Some(FuturePolicy::KeepFuture),
    )?;

    info!("chain now has {} slices", chain.len());

    for (year, month, day) in [(2024, 1, 1), (2024, 3, 1), (2024, 4, 15), (2024, 7, 1)] {
        let probe = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap();
        let state = chain.patch_to_date(&initial, probe)?;
        println!("{}: {:?}", probe, state.entity);
    }

    let (latest, reversed) = chain.reverse(&initial)?;
    println!("state at the far future: {:?}", latest);
    for key_date in reversed.key_dates() {
        let state = reversed.patch_to_date(&latest, key_date)?;
        println!("walked back to {}: {:?}", key_date, state.entity);
    }

    Ok(())
}
