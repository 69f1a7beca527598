//! Merge ordering and environment applicability of fragments.
//!
//! Fragments sort by `(priority, env tag, name, reversed location)`:
//! - lower priority first
//! - at equal priority, env-tagged before untagged, tags alphabetically
//! - then named before unnamed, names alphabetically
//! - then by the character-reversed location id, so distinct locations
//!   never compare equal
//!
//! The first fragment in this order has the highest precedence when merged.

use super::discovery::ConfigFragment;
use super::environment::{LOCAL_MARKER, RuntimeEnvironment};
use std::cmp::Ordering;

impl Ord for ConfigFragment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| present_first(&self.env_tag, &other.env_tag))
            .then_with(|| present_first(&self.name, &other.name))
            .then_with(|| reversed(&self.location_id).cmp(&reversed(&other.location_id)))
            .then_with(|| self.file_name.cmp(&other.file_name))
            .then_with(|| self.body.cmp(&other.body))
    }
}

impl PartialOrd for ConfigFragment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Non-empty strings sort before empty ones; non-empty ones alphabetically.
fn present_first(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => a.cmp(b),
    }
}

fn reversed(s: &str) -> String {
    s.chars().rev().collect()
}

/// Whether `fragment` takes part in the configuration of `env`.
///
/// Untagged fragments apply everywhere, tagged ones only to the environment
/// with exactly that name. Test contexts never see unnamed or `local`
/// fragments.
pub fn applies_to_environment(fragment: &ConfigFragment, env: &RuntimeEnvironment) -> bool {
    if env.is_test_context() && (fragment.name.is_empty() || fragment.name == LOCAL_MARKER) {
        return false;
    }
    fragment.env_tag.is_empty() || fragment.env_tag == env.name()
}
