//! Planner agent: initial plan creation and periodic review.

use anyhow::Result;
use tracing::{info, warn};

use crate::core::plan::{ExecutionPlan, ParsedPlan, ReviewDecision, create_plan, parse_review};
use crate::io::prompt::{PlanPrompt, PromptEngine};
use crate::io::service::GenerativeService;

pub struct PlannerAgent<'a> {
    prompts: &'a PromptEngine,
}

impl<'a> PlannerAgent<'a> {
    pub fn new(prompts: &'a PromptEngine) -> Self {
        Self { prompts }
    }

    /// Ask for a plan. Service failures propagate; unusable replies become
    /// the fallback plan.
    pub fn create<S: GenerativeService + ?Sized>(
        &self,
        service: &S,
        input: &PlanPrompt<'_>,
    ) -> Result<ParsedPlan> {
        let instruction = self.prompts.render_plan(input)?;
        let raw = service.send(&instruction, "")?;
        let parsed = create_plan(&raw);
        if parsed.is_fallback() {
            warn!("planner reply had no usable plan, using fallback");
        }
        Ok(parsed)
    }

    /// Ask whether the remaining plan should change.
    ///
    /// A failed service call is logged and treated as "keep the plan".
    pub fn review<S: GenerativeService + ?Sized>(
        &self,
        service: &S,
        plan: &ExecutionPlan,
        completed: usize,
        steps_remaining: u32,
    ) -> Result<ReviewDecision> {
        let instruction = self
            .prompts
            .render_review(plan, completed, steps_remaining)?;
        let raw = match service.send(&instruction, "") {
            Ok(raw) => raw,
            Err(err) => {
                warn!(err = %err, "plan review failed, keeping plan");
                return Ok(ReviewDecision::Keep);
            }
        };
        let decision = parse_review(&raw);
        if let ReviewDecision::Revise(revised) = &decision {
            info!(from = plan.len(), to = revised.len(), "plan revised");
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::service::ServiceError;
    use crate::test_support::{ScriptedService, plan_of, plan_response};

    fn plan_input() -> PlanPrompt<'static> {
        PlanPrompt {
            prompt: "Build a todo list",
            complexity_level: "medium",
            code_style: "pep8",
            include_tests: true,
            max_items: 10,
        }
    }

    #[test]
    fn create_parses_structured_reply() {
        let prompts = PromptEngine::new();
        let service = ScriptedService::replies([plan_response(3)]);
        let parsed = PlannerAgent::new(&prompts)
            .create(&service, &plan_input())
            .expect("plan");
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.into_plan(), plan_of(3));

        let requests = service.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.contains("Build a todo list"));
        assert!(requests[0].1.is_empty());
    }

    #[test]
    fn create_falls_back_on_prose() {
        let prompts = PromptEngine::new();
        let service = ScriptedService::replies(["I would start with a class."]);
        let parsed = PlannerAgent::new(&prompts)
            .create(&service, &plan_input())
            .expect("plan");
        assert!(parsed.is_fallback());
    }

    #[test]
    fn create_propagates_service_errors() {
        let prompts = PromptEngine::new();
        let service = ScriptedService::new([Err(ServiceError::new("offline"))]);
        let err = PlannerAgent::new(&prompts)
            .create(&service, &plan_input())
            .expect_err("service error");
        assert!(err.downcast_ref::<ServiceError>().is_some());
    }

    #[test]
    fn review_keeps_plan_when_service_fails() {
        let prompts = PromptEngine::new();
        let service = ScriptedService::new([Err(ServiceError::new("timeout"))]);
        let decision = PlannerAgent::new(&prompts)
            .review(&service, &plan_of(6), 3, 10)
            .expect("review");
        assert_eq!(decision, ReviewDecision::Keep);
    }

    #[test]
    fn review_returns_revised_plan() {
        let prompts = PromptEngine::new();
        let reply = r#"{"needs_modification": true, "reason": "merge", "updated_plan": [{"title": "Item 1"}, {"title": "Item 2"}]}"#;
        let service = ScriptedService::replies([reply]);
        let decision = PlannerAgent::new(&prompts)
            .review(&service, &plan_of(6), 3, 10)
            .expect("review");
        match decision {
            ReviewDecision::Revise(plan) => assert_eq!(plan.len(), 2),
            ReviewDecision::Keep => panic!("expected revision"),
        }
    }
}
