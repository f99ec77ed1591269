//! Per-author commit summary.
//!
//! ```text
//! Alice (2):
//!       Add tag resolution
//!       Fix compare links
//!
//! Bob (1):
//!       Bump version
//!
//! ```

use crate::diff::CommitRecord;

const SUBJECT_INDENT: &str = "      ";

/// Render `commits` grouped by author.
///
/// Commits are grouped by login (commits without one share a group), groups
/// are ordered by the author name of their first commit, and commits keep
/// their input order inside a group.
pub fn shortlog(commits: &[CommitRecord]) -> String {
    let mut groups: Vec<(Option<&str>, Vec<&CommitRecord>)> = Vec::new();
    for commit in commits {
        let login = commit.author_login.as_deref();
        match groups.iter().position(|(l, _)| *l == login) {
            Some(idx) => groups[idx].1.push(commit),
            None => groups.push((login, vec![commit])),
        }
    }
    // Stable: equal names keep first-appearance order.
    groups.sort_by(|(_, a), (_, b)| a[0].author_name.cmp(&b[0].author_name));

    let mut out = String::new();
    for (_, members) in groups {
        out.push_str(&format!("{} ({}):\n", members[0].author_name, members.len()));
        for commit in members {
            out.push_str(SUBJECT_INDENT);
            out.push_str(commit.subject());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(login: Option<&str>, name: &str, message: &str) -> CommitRecord {
        CommitRecord {
            sha: format!("{name}-{message}"),
            author_login: login.map(str::to_string),
            author_name: name.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(shortlog(&[]), "");
    }

    #[test]
    fn test_groups_sorted_by_name_with_input_order_inside() {
        let commits = vec![
            commit(Some("zed"), "Zed", "Z1"),
            commit(Some("amy"), "Amy", "A1\n\nbody"),
            commit(Some("zed"), "Zed", "Z2"),
            commit(Some("amy"), "Amy", "A2"),
        ];
        assert_eq!(
            shortlog(&commits),
            "Amy (2):\n      A1\n      A2\n\nZed (2):\n      Z1\n      Z2\n\n"
        );
    }

    #[test]
    fn test_commits_without_login_share_a_group() {
        let commits = vec![
            commit(None, "Ghost", "one"),
            commit(Some("bob"), "Bob", "two"),
            commit(None, "Other Ghost", "three"),
        ];
        assert_eq!(
            shortlog(&commits),
            "Bob (1):\n      two\n\nGhost (2):\n      one\n      three\n\n"
        );
    }

    #[test]
    fn test_same_login_different_names_uses_first_name() {
        let commits = vec![
            commit(Some("al"), "Al", "x"),
            commit(Some("al"), "Alan Smith", "y"),
        ];
        assert!(shortlog(&commits).starts_with("Al (2):\n"));
    }

    #[test]
    fn test_sorting_is_ordinal() {
        let commits = vec![
            commit(Some("b"), "bob", "lower"),
            commit(Some("c"), "Carol", "upper"),
        ];
        let out = shortlog(&commits);
        assert!(out.find("Carol").unwrap() < out.find("bob").unwrap());
    }
}
