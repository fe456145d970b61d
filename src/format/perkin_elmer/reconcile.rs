//! Reconciliation of declared dimensions with the pixel files on disk.
//!
//! Declared counts come from free text and often disagree with what was
//! actually written. The policy is lossy on purpose:
//!
//! 1. Without a declared T size, T is derived from the file count.
//! 2. With one, the plane count is `Z * C * T`, truncated to the file count
//!    (and T recomputed) when there are fewer files.
//! 3. When files still outnumber planes, files are grouped by their Z token
//!    and each group keeps its first `C * T` files.
//!
//! On exit the number of files equals the plane count, which equals
//! `Z * C * T`.

use std::collections::HashMap;

use tracing::info;

use super::companion::{compare_z_sections, z_token};

/// Dimension sizes as declared by the sidecar files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclaredSizes {
    pub size_z: Option<usize>,
    /// Channels stored as separate planes.
    pub size_c: Option<usize>,
    pub size_t: Option<usize>,
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub image_count: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    /// One pixel file per plane, in plane order.
    pub files: Vec<String>,
}

/// Reconcile declared sizes against the canonically sorted pixel files.
pub fn reconcile(declared: DeclaredSizes, files: Vec<String>) -> Reconciled {
    let size_z = declared.size_z.filter(|z| *z > 0).unwrap_or(1);
    let size_c = declared.size_c.filter(|c| *c > 0).unwrap_or(1);
    let zc = size_z * size_c;

    let mut image_count = files.len();
    let size_t = match declared.size_t.filter(|t| *t > 0) {
        None => image_count / zc,
        Some(t) => {
            image_count = zc * t;
            if image_count > files.len() {
                image_count = files.len();
                image_count / zc
            } else {
                t
            }
        }
    };

    let mut result = Reconciled {
        image_count,
        size_z,
        size_c,
        size_t,
        files,
    };
    if result.size_t == 0 {
        fold_onto_z(&mut result);
    }
    remove_extra_files(&mut result);
    settle(&mut result);
    result
}

/// Drop files beyond `C * T` per Z group when the counts disagree.
fn remove_extra_files(r: &mut Reconciled) {
    let expected = r.size_z * r.size_c * r.size_t;
    if r.files.len() <= r.image_count && r.image_count == expected {
        return;
    }
    info!("Removing extraneous files");

    let mut sorted = r.files.clone();
    sorted.sort_by(|a, b| compare_z_sections(a, b));

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for file in sorted {
        let key = z_token(&file).to_string();
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(file);
    }

    let per_group = r.size_c * r.size_t;
    let mut kept = Vec::new();
    for (key, files) in groups {
        // A lone file whose Z token is not numeric is not a plane.
        if files.len() == 1 && key.chars().any(|c| !c.is_ascii_digit()) {
            continue;
        }
        kept.extend(files.into_iter().take(per_group));
    }

    kept.truncate(r.image_count.min(expected));
    r.files = kept;
    r.image_count = expected;
}

/// Shrink T until every plane has a file, then drop unused files.
fn settle(r: &mut Reconciled) {
    let available = r.files.len();
    if r.image_count > available {
        let zc = r.size_z * r.size_c;
        r.size_t = available / zc;
        if r.size_t == 0 {
            fold_onto_z(r);
            return;
        }
        r.image_count = zc * r.size_t;
    }
    r.files.truncate(r.image_count);
}

/// Fewer files than one time point: treat every file as a Z section.
fn fold_onto_z(r: &mut Reconciled) {
    r.size_t = 1;
    r.size_c = 1;
    r.size_z = r.files.len().max(1);
    r.image_count = r.files.len();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("exp_1.{:x}", i)).collect()
    }

    fn declared(z: usize, c: usize, t: Option<usize>) -> DeclaredSizes {
        DeclaredSizes {
            size_z: Some(z),
            size_c: Some(c),
            size_t: t,
        }
    }

    fn assert_consistent(r: &Reconciled) {
        assert_eq!(r.files.len(), r.image_count);
        assert_eq!(r.image_count, r.size_z * r.size_c * r.size_t);
    }

    #[test]
    fn test_exact_match() {
        let r = reconcile(declared(5, 1, Some(1)), files(5));
        assert_eq!(r.image_count, 5);
        assert_eq!(r.size_t, 1);
        assert_eq!(r.files, files(5));
        assert_consistent(&r);
    }

    #[test]
    fn test_derive_t_when_absent() {
        let r = reconcile(declared(2, 2, None), files(12));
        assert_eq!(r.size_t, 3);
        assert_eq!(r.image_count, 12);
        assert_consistent(&r);
    }

    #[test]
    fn test_truncate_to_file_count() {
        // 2 Z * 1 C * 10 T declared, only 7 files written.
        let names: Vec<String> = ["e_1.1", "e_1.2", "e_1.3", "e_1.4", "e_2.1", "e_2.2", "e_2.3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let r = reconcile(declared(2, 1, Some(10)), names);
        assert_eq!(r.size_t, 3);
        assert_eq!(r.image_count, 6);
        assert_eq!(
            r.files,
            vec!["e_1.1", "e_1.2", "e_1.3", "e_2.1", "e_2.2", "e_2.3"]
        );
        assert_consistent(&r);
    }

    #[test]
    fn test_drop_extra_files_per_z_group() {
        // Two Z groups with three files each, but only 2 planes per group.
        let names: Vec<String> = ["e_1.1", "e_1.2", "e_1.3", "e_2.1", "e_2.2", "e_2.3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let r = reconcile(declared(2, 2, Some(1)), names);

        assert_eq!(r.image_count, 4);
        assert_eq!(r.files, vec!["e_1.1", "e_1.2", "e_2.1", "e_2.2"]);
        assert_consistent(&r);
    }

    #[test]
    fn test_missing_sizes_default_to_one() {
        let r = reconcile(DeclaredSizes::default(), files(4));
        assert_eq!((r.size_z, r.size_c, r.size_t), (1, 1, 4));
        assert_consistent(&r);
    }

    #[test]
    fn test_fewer_files_than_one_timepoint() {
        let r = reconcile(declared(4, 2, Some(1)), files(3));
        assert_eq!(r.image_count, 3);
        assert_eq!((r.size_z, r.size_c, r.size_t), (3, 1, 1));
        assert_consistent(&r);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let cases = [
            (declared(5, 1, Some(1)), 5),
            (declared(2, 1, Some(10)), 7),
            (declared(2, 2, None), 13),
            (declared(3, 2, Some(2)), 20),
        ];
        for (sizes, count) in cases {
            let first = reconcile(sizes, files(count));
            let second = reconcile(sizes, files(count));
            assert_eq!(first, second);

            let again = reconcile(
                declared(first.size_z, first.size_c, Some(first.size_t)),
                first.files.clone(),
            );
            assert_eq!(again, first);
        }
    }
}
