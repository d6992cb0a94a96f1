//! Plan validation with at most one revision.

use crate::classifier::ClassificationRequest;
use crate::error::Result;
use crate::intent::{Corpus, IntentResolver};
use crate::prompts;
use crate::types::ResolvedPlan;
use cx_core::SessionContext;
use std::sync::Arc;
use tracing::{info, warn};

const REVISION_MARKER: &str = "NEEDS_REVISION";

/// Classifier verdict on a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// Carries the classifier's reason, possibly empty
    NeedsRevision(String),
}

impl Verdict {
    /// `NEEDS_REVISION` anywhere in the reply asks for a revision; any other
    /// reply, including no reply, accepts the plan.
    pub fn parse(reply: Option<&str>) -> Self {
        let Some(reply) = reply else {
            return Verdict::Valid;
        };
        match reply.find(REVISION_MARKER) {
            Some(at) => {
                let reason = reply[at + REVISION_MARKER.len()..]
                    .trim_start_matches([':', ' '])
                    .trim();
                Verdict::NeedsRevision(reason.to_string())
            }
            None => Verdict::Valid,
        }
    }
}

/// Resolves a plan and double-checks it against the query.
pub struct PlanValidator {
    resolver: Arc<IntentResolver>,
    enabled: bool,
}

impl PlanValidator {
    pub fn new(resolver: Arc<IntentResolver>) -> Self {
        Self {
            resolver,
            enabled: true,
        }
    }

    /// With validation disabled the first plan is returned directly.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn resolver(&self) -> &Arc<IntentResolver> {
        &self.resolver
    }

    pub async fn plan_and_validate(
        &self,
        query: &str,
        corpus: &Corpus,
        session: &SessionContext,
    ) -> Result<ResolvedPlan> {
        let resolution = self
            .resolver
            .resolve_with_context(query, corpus, session)
            .await?;
        if !self.enabled {
            return Ok(resolution.plan);
        }

        let request = ClassificationRequest::new(
            "validate",
            prompts::VALIDATION_SYSTEM,
            prompts::validation_user(query, &resolution.plan),
        )
        .with_session_id(session.id());
        let reply = self.resolver.ask(request, session).await?;

        match Verdict::parse(reply.as_deref()) {
            Verdict::Valid => Ok(resolution.plan),
            Verdict::NeedsRevision(reason) => {
                warn!("Plan {} needs revision: {}", resolution.plan, reason);
                let feedback = format!("{}: {}", REVISION_MARKER, reason);
                let revised = self
                    .resolver
                    .revise(
                        query,
                        corpus,
                        &resolution.plan,
                        &feedback,
                        &resolution.corpus_text,
                        session,
                    )
                    .await?;
                info!("Revised plan {}", revised);
                Ok(revised)
            }
        }
    }
}
