//! Redirect chain resolution
//!
//! Browsers report the status of the terminal response of a navigation, which
//! is usually `200` even when the target itself answered with a `301`/`302`.
//! The capture engine extracts the chain of responses it observed into a
//! [`RedirectChain`] and [`resolve_first_status`] walks it back to the origin.

use serde::{Deserialize, Serialize};

/// Statuses observed for one navigation.
///
/// `predecessors` is ordered from the response nearest to the terminal one
/// back towards the origin request. An entry is `None` when the response for
/// that hop could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectChain {
    pub terminal: u16,
    pub predecessors: Vec<Option<u16>>,
}

impl RedirectChain {
    /// A response that was not reached through any redirect.
    pub fn direct(status: u16) -> Self {
        Self {
            terminal: status,
            predecessors: Vec::new(),
        }
    }

    /// Build a chain from redirect statuses in the order they happened
    /// (origin first) plus the terminal status.
    pub fn from_hops<I>(hops: I, terminal: u16) -> Self
    where
        I: IntoIterator<Item = Option<u16>>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self {
            terminal,
            predecessors: hops.into_iter().rev().collect(),
        }
    }
}

/// Status of the earliest response in the chain.
///
/// Walks backward from the terminal response. An unresolved hop stops the
/// walk and the last resolved status wins.
pub fn resolve_first_status(chain: &RedirectChain) -> u16 {
    let mut first = chain.terminal;

    for hop in &chain.predecessors {
        match hop {
            Some(status) => first = *status,
            None => break,
        }
    }

    first
}

pub fn is_redirect_status(status: u16) -> bool {
    (300..400).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_origin_of_redirect_chain() {
        // 301 -> 302 -> 200
        let chain = RedirectChain::from_hops([Some(301), Some(302)], 200);
        assert_eq!(chain.predecessors, vec![Some(302), Some(301)]);
        assert_eq!(resolve_first_status(&chain), 301);
    }

    #[test]
    fn test_direct_response_keeps_own_status() {
        assert_eq!(resolve_first_status(&RedirectChain::direct(200)), 200);
        assert_eq!(resolve_first_status(&RedirectChain::direct(404)), 404);
        assert!(RedirectChain::direct(200).predecessors.is_empty());
    }

    #[test]
    fn test_unresolved_hop_stops_walk() {
        let chain = RedirectChain {
            terminal: 200,
            predecessors: vec![Some(302), None, Some(301)],
        };
        assert_eq!(resolve_first_status(&chain), 302);

        let chain = RedirectChain {
            terminal: 200,
            predecessors: vec![None, Some(301)],
        };
        assert_eq!(resolve_first_status(&chain), 200);
    }

    #[test]
    fn test_redirect_status_range() {
        assert!(is_redirect_status(301));
        assert!(is_redirect_status(308));
        assert!(!is_redirect_status(200));
        assert!(!is_redirect_status(400));
        assert!(!is_redirect_status(0));
    }
}
