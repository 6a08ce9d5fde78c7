// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::TokenSet;

#[test]
fn mint_remove_accounting() {
    let set = TokenSet::new();
    assert!(set.is_empty());

    let a = set.mint();
    let b = set.mint();
    assert_ne!(a, b);
    assert!(!set.is_empty());
    assert!(set.contains(a));

    assert!(set.remove(a));
    assert!(!set.remove(a));
    assert!(set.contains(b));

    assert!(set.remove(b));
    assert!(set.is_empty());
}
