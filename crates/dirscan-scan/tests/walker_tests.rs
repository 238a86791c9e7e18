use dirscan_scan::{
    walk_all, Entry, EntryType, ProgressReporter, ScanError, ScanProgress, TandemWalk, WalkConfig,
    WalkItem,
};
use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Build a tree from a list of paths; names ending in `/` are directories.
fn create_tree(paths: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for path in paths {
        let full = temp.path().join(path);
        if path.ends_with('/') {
            fs::create_dir_all(&full).unwrap();
        } else {
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, path.as_bytes()).unwrap();
        }
    }
    temp
}

fn relpaths(items: &[WalkItem]) -> Vec<String> {
    items
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect()
}

fn walk(dirs: &[&Path], config: &WalkConfig) -> Vec<WalkItem> {
    let roots = dirs.iter().map(|d| Entry::root(d).unwrap()).collect();
    walk_all(roots, config).unwrap()
}

#[test]
fn test_single_tree_depth_first_ascending() {
    let temp = create_tree(&["b/", "b/z", "b/a", "a", "c/"]);
    let items = walk(&[temp.path()], &WalkConfig::new());
    assert_eq!(relpaths(&items), vec![".", "a", "b", "b/a", "b/z", "c"]);
}

#[test]
fn test_reverse_order() {
    let temp = create_tree(&["b/", "b/z", "b/a", "a", "c/"]);
    let config = WalkConfig::builder().reverse(true).build().unwrap();
    let items = walk(&[temp.path()], &config);
    assert_eq!(relpaths(&items), vec![".", "c", "b", "b/z", "b/a", "a"]);
}

#[test]
fn test_alignment_with_missing() {
    let left = create_tree(&["common", "only_left", "sub/", "sub/x"]);
    let right = create_tree(&["common", "only_right", "sub/", "sub/y"]);

    let items = walk(&[left.path(), right.path()], &WalkConfig::new());
    assert_eq!(
        relpaths(&items),
        vec![".", "common", "only_left", "only_right", "sub", "sub/x", "sub/y"]
    );

    for (path, entries) in &items {
        assert_eq!(entries.len(), 2, "{}", path.display());
    }

    let types = |name: &str| -> (EntryType, EntryType) {
        let (_, entries) = items
            .iter()
            .find(|(p, _)| p.display().to_string() == name)
            .unwrap();
        (entries[0].entry_type(), entries[1].entry_type())
    };
    assert_eq!(types("only_left"), (EntryType::File, EntryType::Missing));
    assert_eq!(types("only_right"), (EntryType::Missing, EntryType::File));
    assert_eq!(types("sub/y"), (EntryType::Missing, EntryType::File));

    let (_, entries) = &items[2];
    assert_eq!(entries[1].full_path(), right.path().join("only_left"));
}

#[test]
fn test_one_sided_directories_not_descended_by_default() {
    let left = create_tree(&["dir/", "dir/inner"]);
    let right = create_tree(&["other"]);

    let items = walk(&[left.path(), right.path()], &WalkConfig::new());
    assert_eq!(relpaths(&items), vec![".", "dir", "other"]);

    let config = WalkConfig::builder()
        .traverse_one_sided(Some(true))
        .build()
        .unwrap();
    let items = walk(&[left.path(), right.path()], &config);
    assert_eq!(relpaths(&items), vec![".", "dir", "dir/inner", "other"]);
}

#[test]
fn test_exclusion_does_not_propagate() {
    let temp = create_tree(&["a", "b/", "b/inner", "b/deeper/", "b/deeper/x", "c"]);
    let config = WalkConfig::builder()
        .excludes(vec!["./b/".to_string()])
        .build()
        .unwrap();

    let items = walk(&[temp.path()], &config);
    assert_eq!(relpaths(&items), vec![".", "a", "b", "c"]);
    assert!(items[2].1[0].is_excluded());
    assert!(!items[1].1[0].is_excluded());
}

#[test]
fn test_glob_exclusion() {
    let temp = create_tree(&["keep.txt", "drop.o", "sub/", "sub/deep.o", "sub/keep"]);
    let config = WalkConfig::builder()
        .excludes(vec!["*.o".to_string()])
        .build()
        .unwrap();

    let items = walk(&[temp.path()], &config);
    let excluded: Vec<String> = items
        .iter()
        .filter(|(_, e)| e[0].is_excluded())
        .map(|(p, _)| p.display().to_string())
        .collect();
    assert_eq!(excluded, vec!["drop.o", "sub/deep.o"]);
}

#[test]
fn test_excluded_root_is_still_yielded() {
    let temp = create_tree(&["a"]);
    let config = WalkConfig::builder()
        .excludes(vec![".".to_string()])
        .build()
        .unwrap();

    let items = walk(&[temp.path()], &config);
    assert_eq!(relpaths(&items), vec!["."]);
    assert!(items[0].1[0].is_excluded());
}

#[test]
fn test_sequential_walks_each_root() {
    let left = create_tree(&["a"]);
    let right = create_tree(&["b"]);
    let config = WalkConfig::builder().sequential(true).build().unwrap();

    let items = walk(&[left.path(), right.path()], &config);
    assert_eq!(relpaths(&items), vec![".", "a", ".", "b"]);
    assert!(items.iter().all(|(_, entries)| entries.len() == 1));
    assert_eq!(items[3].1[0].full_path(), right.path().join("b"));
}

#[test]
fn test_root_must_be_directory() {
    let temp = create_tree(&["file"]);
    let err = TandemWalk::from_paths(&[temp.path().join("file")], &WalkConfig::new()).err();
    assert!(matches!(err, Some(ScanError::NotADirectory { .. })));
}

#[test]
fn test_close_during_disabled_keeps_children() {
    let temp = create_tree(&["sub/", "sub/x"]);
    let root = Entry::root(temp.path()).unwrap();
    let config = WalkConfig::builder().close_during(false).build().unwrap();

    let items = walk_all(vec![root.clone()], &config).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(root.children().unwrap().len(), 1);

    // A second walk over the retained tree sees the same entries
    let again = walk_all(vec![root], &config).unwrap();
    assert_eq!(relpaths(&again), relpaths(&items));
}

#[test]
fn test_progress_is_reported() {
    let temp = create_tree(&["a", "b"]);
    let count = Cell::new(0);
    let progress = ProgressReporter::new(Duration::ZERO, |p: &ScanProgress| count.set(p.count));

    let walk = TandemWalk::from_paths(&[temp.path()], &WalkConfig::new())
        .unwrap()
        .with_progress(progress);
    assert_eq!(walk.count(), 3);
    assert_eq!(count.get(), 3);
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_goes_to_handler() {
    use std::os::unix::fs::PermissionsExt;

    let temp = create_tree(&["locked/", "locked/x", "open"]);
    let locked = temp.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read the directory anyway
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let errors = Cell::new(0);
    let items: Vec<WalkItem> = TandemWalk::from_paths(&[temp.path()], &WalkConfig::new())
        .unwrap()
        .with_error_handler(|_| {
            errors.set(errors.get() + 1);
            true
        })
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(relpaths(&items), vec![".", "locked", "open"]);
    assert_eq!(errors.get(), 1);

    // Without a handler the error ends the walk
    let results: Vec<_> = TandemWalk::from_paths(&[temp.path()], &WalkConfig::new())
        .unwrap()
        .collect();
    assert!(matches!(
        results.last(),
        Some(Err(ScanError::PermissionDenied { .. }))
    ));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_vanished_directory_goes_to_handler() {
    let temp = create_tree(&["gone/", "gone/x", "kept"]);
    let errors = Cell::new(0);
    let mut walk = TandemWalk::from_paths(&[temp.path()], &WalkConfig::new())
        .unwrap()
        .with_error_handler(|err| {
            assert!(matches!(err, ScanError::NotFound { .. }));
            errors.set(errors.get() + 1);
            true
        });

    let (path, _) = walk.next().unwrap().unwrap();
    assert_eq!(path, Path::new("."));
    let (path, _) = walk.next().unwrap().unwrap();
    assert_eq!(path, Path::new("gone"));

    // Listed by its parent, removed before its own listing
    fs::remove_dir_all(temp.path().join("gone")).unwrap();
    let rest: Vec<WalkItem> = walk.collect::<Result<_, _>>().unwrap();
    assert_eq!(relpaths(&rest), vec!["kept"]);
    assert_eq!(errors.get(), 1);
}

#[test]
fn test_vanished_directory_without_handler_ends_walk() {
    let temp = create_tree(&["gone/", "gone/x", "kept"]);
    let mut walk = TandemWalk::from_paths(&[temp.path()], &WalkConfig::new()).unwrap();
    walk.next().unwrap().unwrap();
    walk.next().unwrap().unwrap();

    fs::remove_dir_all(temp.path().join("gone")).unwrap();
    assert!(matches!(walk.next(), Some(Err(ScanError::NotFound { .. }))));
    assert!(walk.next().is_none());
}

#[test]
fn test_one_filesystem_keeps_same_device() {
    let left = create_tree(&["sub/", "sub/a", "only_left"]);
    let right = create_tree(&["sub/", "sub/a"]);
    let config = WalkConfig::builder().one_filesystem(true).build().unwrap();

    let items = walk(&[left.path(), right.path()], &config);
    assert_eq!(relpaths(&items), vec![".", "only_left", "sub", "sub/a"]);
    for (path, entries) in &items {
        for entry in entries {
            assert!(!entry.is_excluded(), "{} excluded", path.display());
        }
    }

    let (_, entries) = &items[1];
    assert_eq!(entries[1].entry_type(), EntryType::Missing);
}
