use std::rc::Rc;

use json_delta::DeltaError;

use crate::slice::Slice;

/// A predicate deciding whether a failed patch application may be swallowed.
///
/// Policies receive the entity reconstructed up to (but not including) the
/// failing slice, the slice itself (`None` when the final deserialization is
/// what failed), and a classification of the failure.
pub type SkipCondition<E> = Rc<dyn Fn(&E, Option<&Slice>, &SkipProbe) -> bool>;

/// What went wrong, for skip conditions to pattern-match on.
pub enum SkipProbe<'a> {
    PatchApplication(&'a DeltaError),
    FinalDeserialization(&'a serde_json::Error),
}

impl SkipProbe<'_> {
    pub fn is_index_out_of_range(&self) -> bool {
        matches!(self, SkipProbe::PatchApplication(cause) if cause.is_index_out_of_range())
    }

    pub fn is_final_deserialization(&self) -> bool {
        matches!(self, SkipProbe::FinalDeserialization(_))
    }
}

/// The stock policy for entities whose list is shorter than the patches
/// expect: swallow index-out-of-range failures as long as the accessor finds
/// the list present at all.
pub fn skip_when_list_unmatched<E, T, A>(accessor: A) -> SkipCondition<E>
where
    A: Fn(&E) -> Option<&[T]> + 'static,
{
    Rc::new(move |entity, _slice, probe| {
        probe.is_index_out_of_range() && accessor(entity).is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Holder {
        items: Option<Vec<i64>>,
    }

    fn out_of_range() -> DeltaError {
        DeltaError::IndexOutOfRange { index: 3, len: 1 }
    }

    #[test]
    fn probe_classification() {
        let cause = out_of_range();
        let patch_probe = SkipProbe::PatchApplication(&cause);
        assert!(patch_probe.is_index_out_of_range());
        assert!(!patch_probe.is_final_deserialization());

        let serde_err = serde_json::from_str::<i64>("not a number").unwrap_err();
        let final_probe = SkipProbe::FinalDeserialization(&serde_err);
        assert!(final_probe.is_final_deserialization());
        assert!(!final_probe.is_index_out_of_range());
    }

    #[test]
    fn list_unmatched_policy_needs_both_conditions() {
        let policy = skip_when_list_unmatched(|holder: &Holder| holder.items.as_deref());
        let cause = out_of_range();
        let probe = SkipProbe::PatchApplication(&cause);

        let with_list = Holder {
            items: Some(vec![1]),
        };
        let without_list = Holder { items: None };
        assert!(policy(&with_list, None, &probe));
        assert!(!policy(&without_list, None, &probe));

        let serde_err = serde_json::from_str::<i64>("not a number").unwrap_err();
        let other_probe = SkipProbe::FinalDeserialization(&serde_err);
        assert!(!policy(&with_list, None, &other_probe));
    }
}
