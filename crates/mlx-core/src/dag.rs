// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency-graph validation for a [`Manifest`]'s modules.
//!
//! Performed once, up front, before any fetch job is spawned — this avoids
//! deadlocking a receive engine on a wait-set that can never complete.

use crate::error::LoaderError;
use crate::model::Manifest;
use std::collections::{HashMap, HashSet};

/// Validate that every `dependsOnIds` entry resolves to a module present in
/// `manifest.modules`, and that the resulting graph is acyclic.
///
/// # Errors
///
/// Returns [`LoaderError::MissingDependency`] for the first unresolved
/// dependency encountered (in manifest order), or
/// [`LoaderError::CycleDetected`] if a cycle exists and every dependency
/// resolves.
pub fn validate(manifest: &Manifest) -> Result<(), LoaderError> {
    for (id, module) in &manifest.modules {
        for dep in &module.depends_on_ids {
            if !manifest.modules.contains_key(dep) {
                return Err(LoaderError::MissingDependency {
                    from: id.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }

    detect_cycle(manifest)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

fn detect_cycle(manifest: &Manifest) -> Result<(), LoaderError> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for id in manifest.modules.keys() {
        if !marks.contains_key(id.as_str()) {
            visit(manifest, id, &mut marks)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    manifest: &'a Manifest,
    id: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
) -> Result<(), LoaderError> {
    marks.insert(id, Mark::InProgress);

    if let Some(module) = manifest.modules.get(id) {
        for dep in &module.depends_on_ids {
            match marks.get(dep.as_str()) {
                Some(Mark::InProgress) => {
                    return Err(LoaderError::CycleDetected { id: dep.clone() });
                }
                Some(Mark::Done) => continue,
                None => visit(manifest, dep.as_str(), marks)?,
            }
        }
    }

    marks.insert(id, Mark::Done);
    Ok(())
}

/// Compute the full set of transitive dependency ids for `id` (not
/// including `id` itself). Assumes the graph has already been validated
/// acyclic via [`validate`].
#[must_use]
pub fn transitive_deps(manifest: &Manifest, id: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        if let Some(module) = manifest.modules.get(&current) {
            for dep in &module.depends_on_ids {
                if out.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }
    }
    out
}

/// Returns `true` if `ancestor` is a (possibly transitive) dependency of
/// `of`.
#[must_use]
pub fn depends_on(manifest: &Manifest, of: &str, ancestor: &str) -> bool {
    transitive_deps(manifest, of).contains(ancestor)
}
