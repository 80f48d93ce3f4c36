#![no_main]

// A parsed filename renders to a canonical form that parses back to the same
// placement, and rendered placements always parse.

use arbitrary::Arbitrary;
use bootstate_core::{ArtifactPlacement, Revision};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Input {
    Filename(String),
    Parts { name: String, revision: i32 },
}

fuzz_target!(|input: Input| {
    match input {
        Input::Filename(filename) => {
            if let Ok(placement) = ArtifactPlacement::from_filename(&filename) {
                let canonical = ArtifactPlacement::from_filename(&placement.filename()).unwrap();
                assert_eq!(canonical, placement);
            }
        }
        Input::Parts { name, revision } => {
            if let Ok(placement) = ArtifactPlacement::new(&name, Revision(revision)) {
                let parsed = ArtifactPlacement::from_filename(&placement.filename()).unwrap();
                assert_eq!(parsed, placement);
            }
        }
    }
});
