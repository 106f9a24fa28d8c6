//! Category based contractor matching.

use std::cmp::Ordering;

use super::domain::ContractorProfile;

/// Whether any of the contractor's specialties covers `category`.
///
/// A specialty covers a category when it contains it, ignoring case and surrounding
/// whitespace, so `"plumbing"` matches `"Plumbing & heating"`.
pub fn covers(profile: &ContractorProfile, category: &str) -> bool {
    let needle = category.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    profile
        .specialties
        .iter()
        .any(|specialty| specialty.to_lowercase().contains(&needle))
}

/// Best active contractor for `category`: highest rating, then lowest profile id.
///
/// The result does not depend on the order of `contractors`. `None` means nobody fits and the
/// request should simply stay with the owner.
pub fn best_match<'a>(
    category: &str,
    contractors: &'a [ContractorProfile],
) -> Option<&'a ContractorProfile> {
    contractors
        .iter()
        .filter(|profile| profile.active && covers(profile, category))
        .min_by(|a, b| rank(a, b))
}

fn rank(a: &ContractorProfile, b: &ContractorProfile) -> Ordering {
    b.rating
        .total_cmp(&a.rating)
        .then_with(|| a.id.cmp(&b.id))
}
