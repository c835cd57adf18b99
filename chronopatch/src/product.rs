use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::chain::Chain;
use crate::error::ChainResult;

/// The states of two independently tracked entities at one shared key date.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductEntry<A, B> {
    pub key_date: DateTime<Utc>,
    pub left: A,
    pub right: B,
}

/// A read-only join of two chains over the union of their key dates.
///
/// The chains stay independent: every entry is produced by one
/// reconstruction per chain, nothing is merged across them.
pub struct ChainProduct<'a, A, B> {
    left_chain: &'a Chain<A>,
    left_initial: &'a A,
    right_chain: &'a Chain<B>,
    right_initial: &'a B,
}

impl<'a, A, B> ChainProduct<'a, A, B>
where
    A: Clone,
    B: Clone,
{
    pub fn new(
        left_chain: &'a Chain<A>,
        left_initial: &'a A,
        right_chain: &'a Chain<B>,
        right_initial: &'a B,
    ) -> Self {
        ChainProduct {
            left_chain,
            left_initial,
            right_chain,
            right_initial,
        }
    }

    pub fn entries(&self) -> ChainResult<Vec<ProductEntry<A, B>>> {
        let key_dates = self
            .left_chain
            .key_dates()
            .chain(self.right_chain.key_dates())
            .sorted()
            .dedup();
        key_dates
            .map(|key_date| {
                Ok(ProductEntry {
                    key_date,
                    left: self
                        .left_chain
                        .patch_to_date(self.left_initial, key_date)?
                        .entity,
                    right: self
                        .right_chain
                        .patch_to_date(self.right_initial, key_date)?
                        .entity,
                })
            })
            .collect()
    }
}

/// The states of any number of same-typed entities at one shared key date.
#[derive(Clone, Debug, PartialEq)]
pub struct JointEntry<E> {
    pub key_date: DateTime<Utc>,
    pub states: Vec<E>,
}

/// Samples every chain at the union of all their key dates.
pub fn joint_timeline<E>(chains: &[(&Chain<E>, &E)]) -> ChainResult<Vec<JointEntry<E>>>
where
    E: Clone,
{
    let key_dates = chains
        .iter()
        .flat_map(|(chain, _)| chain.key_dates())
        .sorted()
        .dedup();
    key_dates
        .map(|key_date| {
            let states = chains
                .iter()
                .map(|(chain, initial)| Ok(chain.patch_to_date(initial, key_date)?.entity))
                .collect::<ChainResult<Vec<E>>>()?;
            Ok(JointEntry { key_date, states })
        })
        .collect()
}
