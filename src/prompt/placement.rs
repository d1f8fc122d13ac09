//! Placement assembler.

use crate::library::{FragmentLibrary, Placement};
use crate::prompt::conditional::Selection;

/// Separator between fragments in an assembled prompt.
pub const SEPARATOR: &str = ", ";

/// Flatten per-collection selections into one ordered fragment list.
///
/// `start` collections come first, then untagged ones, then `end`
/// collections. Within each group collections follow library declaration
/// order and fragments keep their selection order. Selections for names the
/// library does not know are treated as untagged.
#[must_use]
pub fn assemble(library: &FragmentLibrary, selection: &Selection) -> Vec<String> {
    let placement_of = |name: &str| {
        library
            .get(name)
            .map(|collection| collection.placement)
            .unwrap_or_default()
    };

    let mut fragments = Vec::with_capacity(selection.values().map(Vec::len).sum());
    for group in [Placement::Start, Placement::None, Placement::End] {
        for (name, picked) in selection {
            if placement_of(name) == group {
                fragments.extend(picked.iter().cloned());
            }
        }
    }
    fragments
}

/// Join fragments with [`SEPARATOR`].
#[must_use]
pub fn join(fragments: &[String]) -> String {
    fragments.join(SEPARATOR)
}
