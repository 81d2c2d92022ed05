use std::cmp::Ordering;
use std::fmt;

/// Compare two dotted version strings component-wise.
///
/// Components compare as integers when both sides parse, otherwise
/// lexicographically. The shorter version is padded with zeros, so
/// `1.0` equals `1` and `1.0.1` is newer than `1`.
pub fn compare_version_numbers(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let l = l.unwrap_or("0");
                let r = r.unwrap_or("0");
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Compare a candidate version against the installed one.
///
/// An installed version flagged broken never wins: the gate always
/// upgrades away from it, whatever the candidate claims to be.
pub fn compare_skip_broken(
    candidate: &str,
    installed: &str,
    installed_is_broken: bool,
) -> Ordering {
    if installed_is_broken {
        return Ordering::Greater;
    }
    compare_version_numbers(candidate, installed)
}

/// Ordered identifier of a host release, e.g. `241.3` or `2024.2.130`.
///
/// An optional product prefix up to the last `-` is ignored when
/// parsing, so `build-150` reads as `150`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNumber {
    components: Vec<u64>,
}

impl BuildNumber {
    pub fn new(components: Vec<u64>) -> Self {
        Self { components }
    }

    /// Parse a dotted build string; `None` when any component is not
    /// an integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.rsplit('-').next().unwrap_or(raw);
        let components = digits
            .split('.')
            .map(|part| part.trim().parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        if components.is_empty() {
            return None;
        }
        Some(Self { components })
    }
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Ord for BuildNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let l = self.components.get(i).copied().unwrap_or(0);
            let r = other.components.get(i).copied().unwrap_or(0);
            match l.cmp(&r) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for BuildNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_components_compare_as_integers() {
        assert_eq!(compare_version_numbers("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_version_numbers("2.0", "10.0"), Ordering::Less);
        assert_eq!(compare_version_numbers("1.2.3", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn shorter_version_is_zero_padded() {
        assert_eq!(compare_version_numbers("1", "1.0"), Ordering::Equal);
        assert_eq!(compare_version_numbers("1.0.1", "1"), Ordering::Greater);
        assert_eq!(compare_version_numbers("1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn non_numeric_components_compare_lexicographically() {
        assert_eq!(compare_version_numbers("1.beta", "1.alpha"), Ordering::Greater);
        assert_eq!(compare_version_numbers("1.0-rc", "1.0-rc"), Ordering::Equal);
    }

    #[test]
    fn healthy_install_skips_older_and_equal_candidates() {
        assert_eq!(compare_skip_broken("1.5", "2.0", false), Ordering::Less);
        assert_eq!(compare_skip_broken("2.0", "2.0", false), Ordering::Equal);
        assert_eq!(compare_skip_broken("2.1", "2.0", false), Ordering::Greater);
    }

    #[test]
    fn broken_install_loses_to_any_candidate() {
        assert_eq!(compare_skip_broken("1.5", "2.0", true), Ordering::Greater);
        assert_eq!(compare_skip_broken("2.0", "2.0", true), Ordering::Greater);
        assert_eq!(compare_skip_broken("0.1", "2.0", true), Ordering::Greater);
    }

    #[test]
    fn build_numbers_parse_and_order() {
        let old = BuildNumber::parse("241.3").unwrap();
        let new = BuildNumber::parse("241.10").unwrap();
        assert!(old < new);
        assert_eq!(BuildNumber::parse("build-150").unwrap(), BuildNumber::new(vec![150]));
        assert!(BuildNumber::parse("not a build").is_none());
        assert!(BuildNumber::parse("").is_none());
    }

    #[test]
    fn build_number_comparison_pads_with_zeros() {
        let short = BuildNumber::parse("241").unwrap();
        let long = BuildNumber::parse("241.0.0").unwrap();
        assert_eq!(short.cmp(&long), Ordering::Equal);
        assert!(BuildNumber::parse("241.0.1").unwrap() > short);
    }
}
