//! Deciding which task output is "the" generated artifact.

use std::collections::BTreeSet;

use checkloop_common::Artifact;
use serde::{Deserialize, Serialize};

use super::wire::TaskOutput;

/// Fingerprint of a task's output set: sorted, de-duplicated URLs joined by `|`.
///
/// Independent of the order the service lists outputs in.
pub fn fingerprint<'a>(urls: impl IntoIterator<Item = &'a str>) -> String {
    let set: BTreeSet<&str> = urls.into_iter().collect();
    set.into_iter().collect::<Vec<_>>().join("|")
}

pub fn outputs_fingerprint(outputs: &[TaskOutput]) -> String {
    fingerprint(outputs.iter().map(|o| o.url.as_str()))
}

/// Storage path fragments that mark where an output came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMarkers {
    pub generated: Vec<String>,
    pub uploaded: Vec<String>,
}

impl Default for PathMarkers {
    fn default() -> Self {
        Self {
            generated: ["sandbox", "outputs", "generated"]
                .map(String::from)
                .to_vec(),
            uploaded: ["uploads", "upload", "user_files", "attachments"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Generated,
    Uploaded,
    Unmarked,
}

impl PathMarkers {
    fn origin(&self, output: &TaskOutput) -> Origin {
        let path = output.path.as_deref().unwrap_or(&output.url).to_ascii_lowercase();
        let segments: Vec<&str> = path.split(['/', '\\']).collect();
        let has = |markers: &[String]| {
            markers
                .iter()
                .any(|m| segments.iter().any(|s| s.eq_ignore_ascii_case(m)))
        };
        // generated wins when both appear, e.g. sandbox/uploads/...
        if has(&self.generated) {
            Origin::Generated
        } else if has(&self.uploaded) {
            Origin::Uploaded
        } else {
            Origin::Unmarked
        }
    }
}

fn matches_kind(output: &TaskOutput, kind: &str) -> bool {
    let kind = kind.trim_start_matches('.').to_ascii_lowercase();
    let artifact = output.to_artifact();
    if artifact.extension().as_deref() == Some(kind.as_str()) {
        return true;
    }
    match output.mime_type.as_deref() {
        Some(mime) => mime_guess::from_ext(&kind)
            .iter()
            .any(|m| m.essence_str().eq_ignore_ascii_case(mime)),
        None => false,
    }
}

/// Pick the primary artifact of kind `kind` from a task's outputs.
///
/// Tiers are searched in order: generated, unmarked, uploaded. Within a tier,
/// outputs whose filename equals an input filename are skipped and the last
/// output matching `kind` by extension or mime type wins. The first tier with
/// a match decides.
pub fn select_primary(
    outputs: &[TaskOutput],
    input_names: &[String],
    kind: &str,
    markers: &PathMarkers,
) -> Option<Artifact> {
    [Origin::Generated, Origin::Unmarked, Origin::Uploaded]
        .into_iter()
        .find_map(|origin| {
            outputs
                .iter()
                .rev()
                .filter(|o| markers.origin(o) == origin)
                .find(|o| {
                    let name = o.file_name();
                    !input_names.iter().any(|input| *input == name) && matches_kind(o, kind)
                })
        })
        .map(TaskOutput::to_artifact)
}
