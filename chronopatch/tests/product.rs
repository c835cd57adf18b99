use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use chronopatch::{joint_timeline, Chain, ChainProduct, Direction};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Price {
    cents: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Label {
    text: String,
}

fn price(cents: i64) -> Price {
    Price { cents }
}

fn label(text: &str) -> Label {
    Label {
        text: text.to_string(),
    }
}

fn date(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

#[test]
fn two_chains_join_at_the_union_of_their_key_dates() -> Result<()> {
    let initial_price = price(100);
    let mut prices = Chain::new(Direction::Forward);
    prices.add(&initial_price, &price(120), date(2022), None)?;
    prices.add(&initial_price, &price(150), date(2024), None)?;

    let initial_label = label("launch");
    let mut labels = Chain::new(Direction::Forward);
    labels.add(&initial_label, &label("steady"), date(2023), None)?;

    let product = ChainProduct::new(&prices, &initial_price, &labels, &initial_label);
    let entries = product.entries()?;

    let summary: Vec<_> = entries
        .iter()
        .map(|entry| (entry.key_date, entry.left.cents, entry.right.text.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (date(2022), 120, "launch"),
            (date(2023), 120, "steady"),
            (date(2024), 150, "steady"),
        ]
    );
    Ok(())
}

#[test]
fn shared_key_dates_are_not_repeated() -> Result<()> {
    let initial = price(0);
    let mut left = Chain::new(Direction::Forward);
    left.add(&initial, &price(1), date(2022), None)?;
    let mut right = Chain::new(Direction::Forward);
    right.add(&initial, &price(2), date(2022), None)?;

    let entries = ChainProduct::new(&left, &initial, &right, &initial).entries()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key_date, date(2022));
    assert_eq!(entries[0].left, price(1));
    assert_eq!(entries[0].right, price(2));
    Ok(())
}

#[test]
fn joint_timeline_samples_every_chain() -> Result<()> {
    let initial = price(0);
    let mut first = Chain::new(Direction::Forward);
    first.add(&initial, &price(10), date(2021), None)?;
    let mut second = Chain::new(Direction::Forward);
    second.add(&initial, &price(20), date(2023), None)?;
    let third: Chain<Price> = Chain::new(Direction::Forward);

    let entries = joint_timeline(&[
        (&first, &initial),
        (&second, &initial),
        (&third, &initial),
    ])?;

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key_date, date(2021));
    assert_eq!(entries[0].states, vec![price(10), price(0), price(0)]);
    assert_eq!(entries[1].key_date, date(2023));
    assert_eq!(entries[1].states, vec![price(10), price(20), price(0)]);
    Ok(())
}

#[test]
fn an_empty_product_has_no_entries() -> Result<()> {
    let initial = price(0);
    let left: Chain<Price> = Chain::new(Direction::Forward);
    let right: Chain<Price> = Chain::new(Direction::Forward);
    let entries = ChainProduct::new(&left, &initial, &right, &initial).entries()?;
    assert!(entries.is_empty());
    Ok(())
}
