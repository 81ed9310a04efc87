//! Committee vote thresholds.
//!
//! A round commits with at least ⌈2N/3⌉ agreeing votes and is abandoned once
//! more than ⌊N/3⌋ members disagree. The two can never hold together, since
//! ⌈2N/3⌉ + ⌊N/3⌋ + 1 > N.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Commit,
    Abandon,
    Pending,
}

/// Agreeing votes needed to commit.
pub fn agree_threshold(committee_size: usize) -> usize {
    (2 * committee_size.max(1)).div_ceil(3)
}

/// A round is abandoned once disagreement exceeds this.
pub fn disagree_tolerance(committee_size: usize) -> usize {
    committee_size.max(1) / 3
}

pub fn evaluate(agree: usize, disagree: usize, committee_size: usize) -> Verdict {
    if agree >= agree_threshold(committee_size) {
        Verdict::Commit
    } else if disagree > disagree_tolerance(committee_size) {
        Verdict::Abandon
    } else {
        Verdict::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn four_member_committee() {
        assert_eq!(agree_threshold(4), 3);
        assert_eq!(disagree_tolerance(4), 1);
        assert_eq!(evaluate(3, 1, 4), Verdict::Commit);
        assert_eq!(evaluate(2, 1, 4), Verdict::Pending);
        assert_eq!(evaluate(2, 2, 4), Verdict::Abandon);
    }

    #[test]
    fn single_member_commits_alone() {
        assert_eq!(evaluate(1, 0, 1), Verdict::Commit);
        assert_eq!(evaluate(0, 1, 1), Verdict::Abandon);
    }

    proptest! {
        #[test]
        fn commit_and_abandon_are_exclusive(n in 1usize..200, agree in 0usize..200) {
            let agree = agree.min(n);
            let disagree = n - agree;
            let commit = agree >= agree_threshold(n);
            let abandon = disagree > disagree_tolerance(n);
            prop_assert!(!(commit && abandon));
            // With every vote in, the round always resolves.
            prop_assert!(commit || abandon);
        }
    }
}
