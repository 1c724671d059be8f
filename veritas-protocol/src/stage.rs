//! Stage identifiers shared by the pipeline and the wire protocol.

use strum_macros::{Display, EnumString};

/// Internal stage registry names, in execution order.
///
/// `Stage03Wiki`/`Stage03Web`/`Stage03Merge` are a single public
/// "collect evidence" step split into two fan-out branches and a merge,
/// mirroring how the evidence-gathering stage is actually dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StageName {
    Stage01Normalize,
    AdapterQueries,
    Stage03Wiki,
    Stage03Web,
    Stage03Merge,
    Stage04Score,
    Stage05Topk,
    Stage06VerifySupport,
    Stage07VerifySkeptic,
    Stage08Merge,
    Stage09Judge,
}

pub const STAGE_ORDER: &[StageName] = &[
    StageName::Stage01Normalize,
    StageName::AdapterQueries,
    StageName::Stage03Wiki,
    StageName::Stage03Web,
    StageName::Stage03Merge,
    StageName::Stage04Score,
    StageName::Stage05Topk,
    StageName::Stage06VerifySupport,
    StageName::Stage07VerifySkeptic,
    StageName::Stage08Merge,
    StageName::Stage09Judge,
];

/// Public-facing alias accepted as a `start_stage`/`end_stage` override.
///
/// `stage03_collect` resolves to `stage03_wiki` as a start stage and to
/// `stage03_merge` as an end stage, since callers think of evidence
/// collection as one step even though it internally fans out.
pub fn normalize_stage_name(raw: &str, is_end: bool) -> Option<StageName> {
    if raw == "stage03_collect" {
        return Some(if is_end {
            StageName::Stage03Merge
        } else {
            StageName::Stage03Wiki
        });
    }
    raw.parse().ok()
}

pub fn is_stage_name(raw: &str) -> bool {
    raw == "stage03_collect" || raw.parse::<StageName>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_has_eleven_entries() {
        assert_eq!(STAGE_ORDER.len(), 11);
    }

    #[test]
    fn round_trips_through_display_and_parse() {
        for stage in STAGE_ORDER {
            let text = stage.to_string();
            let parsed: StageName = text.parse().expect("stage name should round-trip");
            assert_eq!(parsed, *stage);
        }
    }

    #[test]
    fn collect_alias_resolves_to_wiki_at_start_and_merge_at_end() {
        assert_eq!(
            normalize_stage_name("stage03_collect", false),
            Some(StageName::Stage03Wiki)
        );
        assert_eq!(
            normalize_stage_name("stage03_collect", true),
            Some(StageName::Stage03Merge)
        );
    }

    #[test]
    fn unknown_stage_name_is_rejected() {
        assert!(!is_stage_name("stage99_nonexistent"));
        assert_eq!(normalize_stage_name("stage99_nonexistent", false), None);
    }
}
