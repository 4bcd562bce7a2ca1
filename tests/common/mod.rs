#![allow(dead_code)]

use ck_context::StaticRepoMetadata;

/// Stand-in for the git lookup so plans are reproducible.
pub fn fake_repo() -> StaticRepoMetadata {
    StaticRepoMetadata::new([
        ("repo", "https://github.com/acme/context.git"),
        ("branch", "main"),
        ("commit", "9f1c2e7"),
    ])
}
