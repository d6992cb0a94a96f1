//! Prompt text for the classifier stages.

use crate::types::ResolvedPlan;
use cx_core::SessionContext;

/// Turns of conversation history included in a prompt.
const HISTORY_TURNS: usize = 10;

pub const SELECTION_SYSTEM: &str = "You are a helpful assistant that finds the API endpoint \
matching a request. Answer with the HTTP method and the path exactly as listed.";

pub const PLAN_SYSTEM: &str = "\
Given a query from a user, analyze the intent and determine the API request that fulfills it.
Use ONLY endpoints from the provided OpenAPI specs and validate parameters against them.
Keep {placeholders} in the endpoint as written in the specs; do not fill them in.
Respond with:
1. requestType: the HTTP method (GET, POST, PUT, DELETE or PATCH)
2. endpoint: the path template to call
3. body: the JSON request body, only when the method sends one
4. explanation: a brief explanation of what this request will do";

pub const VALIDATION_SYSTEM: &str = "\
Validate if the following API execution plan correctly addresses the user's query.
Respond with either:
\"VALID\" if the execution plan correctly addresses the user's query, or
\"NEEDS_REVISION: [specific reason]\" if the plan doesn't properly address the query.";

/// User prompt for choosing one operation from the synopsis list.
pub fn selection_user(query: &str, synopses: &str, session: &SessionContext) -> String {
    with_session_notes(
        format!(
            "Here are the endpoints and descriptions:\n{}\n\n\
             I am looking for the method and path that best match the query: {}",
            synopses, query
        ),
        session,
    )
}

/// User prompt for producing the full plan from specification text.
pub fn plan_user(query: &str, corpus_text: &str, session: &SessionContext) -> String {
    with_session_notes(
        format!(
            "Here is the query: {}\n\nHere are the Open API specs available:\n{}",
            query, corpus_text
        ),
        session,
    )
}

pub fn validation_user(query: &str, plan: &ResolvedPlan) -> String {
    format!("User query: {}\n\nAPI execution plan: {}", query, render_plan(plan))
}

/// User prompt for the single revision after a `NEEDS_REVISION` verdict.
pub fn revision_user(
    feedback: &str,
    query: &str,
    previous: &ResolvedPlan,
    corpus_text: &str,
    session: &SessionContext,
) -> String {
    with_session_notes(
        format!(
            "Revise the API execution plan based on this feedback: {}\n\n\
             User query: {}\n\nPrevious plan: {}\n\nAvailable OpenAPI specs:\n{}",
            feedback,
            query,
            render_plan(previous),
            corpus_text
        ),
        session,
    )
}

/// Cart id and recent history, or an empty string when the session has neither.
pub fn session_notes(session: &SessionContext) -> String {
    let mut notes = Vec::new();
    if let Some(cart_id) = session.cart_id() {
        notes.push(format!("Current cart ID: {}", cart_id));
    }

    let history = session.conversation_history();
    if !history.is_empty() {
        let start = history.len().saturating_sub(HISTORY_TURNS);
        notes.push(format!(
            "Previous conversation:\n{}",
            history[start..].join("\n")
        ));
    }
    notes.join("\n\n")
}

fn with_session_notes(prompt: String, session: &SessionContext) -> String {
    let notes = session_notes(session);
    if notes.is_empty() {
        prompt
    } else {
        format!("{}\n\n{}", prompt, notes)
    }
}

fn render_plan(plan: &ResolvedPlan) -> String {
    serde_json::to_string(plan).unwrap_or_else(|_| plan.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;
    use serde_json::json;

    #[test]
    fn test_session_notes() {
        let session = SessionContext::new();
        assert_eq!(session_notes(&session), "");

        let session = SessionContext::new()
            .with_cart_id("cart-42")
            .with_history(["user: hi", "assistant: hello"]);
        let notes = session_notes(&session);
        assert!(notes.contains("Current cart ID: cart-42"));
        assert!(notes.contains("user: hi\nassistant: hello"));
    }

    #[test]
    fn test_history_is_bounded() {
        let turns: Vec<String> = (0..15).map(|i| format!("turn {}", i)).collect();
        let session = SessionContext::new().with_history(turns);
        let notes = session_notes(&session);
        assert!(!notes.contains("turn 4\n"));
        assert!(notes.contains("turn 5"));
        assert!(notes.contains("turn 14"));
    }

    #[test]
    fn test_plan_user_includes_query_and_cart() {
        let session = SessionContext::new().with_cart_id("cart-42");
        let prompt = plan_user("add product ABC123 to cart", "POST /v2/carts/{cartId}/items", &session);
        assert!(prompt.contains("Here is the query: add product ABC123 to cart"));
        assert!(prompt.ends_with("Current cart ID: cart-42"));
    }

    #[test]
    fn test_revision_user_carries_feedback_and_plan() {
        let plan = ResolvedPlan::new(HttpMethod::Get, "/v2/carts/{cartId}")
            .with_body(json!({"a": 1}));
        let prompt = revision_user(
            "NEEDS_REVISION: wrong verb",
            "add item",
            &plan,
            "specs",
            &SessionContext::new(),
        );
        assert!(prompt.contains("wrong verb"));
        assert!(prompt.contains("\"path\":\"/v2/carts/{cartId}\""));
    }
}
