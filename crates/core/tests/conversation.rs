//! End-to-end conversation tests for the wren engine.
//!
//! Every test drives `Engine::process_input` the way a frontend would and
//! checks replies, state and the committed turn record.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wren_core::catalog::Catalog;
use wren_core::config::EngineCfg;
use wren_core::memory::KEY_SELECTED_OUTLET;
use wren_core::types::{Action, ConversationState, OutletRef, Region, SessionExport};
use wren_core::{Engine, Session};
use wren_tool::{ScriptedBackend, ToolError};

fn engine() -> Engine {
    Engine::with_defaults().unwrap()
}

fn fast_cfg() -> EngineCfg {
    EngineCfg {
        health_timeout_ms: 100,
        call_timeout_ms: 100,
        retry_delay_ms: 1,
        ..EngineCfg::default()
    }
}

async fn say(engine: &Engine, session: &mut Session, text: &str) -> String {
    engine.process_input(session, text).await
}

/// Region → outlet → detail → thanks, the canonical outlet conversation.
#[tokio::test]
async fn outlet_conversation_to_completion() {
    let engine = engine();
    let mut s = engine.new_session();

    // 1. Region with two outlets asks which one
    let reply = say(&engine, &mut s, "Is there an outlet in Petaling Jaya?").await;
    assert_eq!(
        reply,
        "Yes! We have outlets in Petaling Jaya. Which outlet are you referring to? We have: SS 2 Outlet, PJ Central Outlet"
    );
    assert_eq!(s.memory().state(), ConversationState::OutletSelection);
    assert_eq!(s.memory().inquiry_location(), Some(Region::PetalingJaya));

    // 2. Outlet plus sub-intent answers straight away
    let reply = say(&engine, &mut s, "SS 2, what's the opening time?").await;
    assert!(reply.contains("SS 2 Outlet opens at 9:00 AM and closes at 10:00 PM"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::InformationRequest);
    assert_eq!(
        s.memory().selected_outlet(),
        Some(OutletRef::new(Region::PetalingJaya, "SS 2 Outlet"))
    );

    // 3. Follow-up about the same outlet
    let reply = say(&engine, &mut s, "And the phone number?").await;
    assert!(reply.contains("+603-1234-5678"), "{reply}");

    // 4. Thanks ends it
    let reply = say(&engine, &mut s, "Thanks!").await;
    assert!(reply.starts_with("You're welcome!"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::Completed);
    assert_eq!(s.memory().turns().len(), 4);
}

#[tokio::test]
async fn topic_switch_moves_region_and_clears_selection() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "Is there an outlet in Petaling Jaya?").await;
    say(&engine, &mut s, "SS 2 please").await;
    assert_eq!(s.memory().state(), ConversationState::InformationRequest);

    let reply = say(&engine, &mut s, "Actually, what about Kuala Lumpur?").await;
    assert_eq!(
        reply,
        "Switching to Kuala Lumpur. Which outlet are you referring to? We have: KLCC Outlet"
    );
    assert_eq!(s.memory().state(), ConversationState::OutletSelection);
    assert_eq!(s.memory().inquiry_location(), Some(Region::KualaLumpur));
    assert!(s.memory().get_context(KEY_SELECTED_OUTLET).is_none());

    let reply = say(&engine, &mut s, "KLCC").await;
    assert!(reply.starts_with("Perfect! You're asking about the KLCC Outlet"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::InformationRequest);
}

#[tokio::test]
async fn single_outlet_region_selects_directly() {
    let engine = engine();
    let mut s = engine.new_session();
    let reply = say(&engine, &mut s, "Any outlets in Kuala Lumpur?").await;
    assert!(reply.contains("KLCC Outlet"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::InformationRequest);

    let reply = say(&engine, &mut s, "What's the address?").await;
    assert!(reply.contains("789 KLCC Mall, Kuala Lumpur"), "{reply}");
}

#[tokio::test]
async fn vague_outlet_question_asks_for_area() {
    let engine = engine();
    let mut s = engine.new_session();

    let reply = say(&engine, &mut s, "Do you have any outlets?").await;
    assert!(reply.contains("Which area are you interested in"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::LocationInquiry);
    assert_eq!(s.memory().turns()[0].action, Some(Action::AskFollowup));

    let reply = say(&engine, &mut s, "Penang").await;
    assert!(reply.contains("don't have any outlets in Penang"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::LocationInquiry);

    let reply = say(&engine, &mut s, "Petaling Jaya").await;
    assert!(reply.starts_with("Great! We have outlets in Petaling Jaya."), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::OutletSelection);
}

#[tokio::test]
async fn near_me_and_your_area_ask_for_area() {
    let engine = engine();
    for text in ["Any outlets near me?", "Are there outlets in your area?"] {
        let mut s = engine.new_session();
        let reply = say(&engine, &mut s, text).await;
        assert!(reply.contains("Which area are you interested in"), "{text}: {reply}");
        assert!(!reply.contains(" Me") && !reply.contains("Your Area"), "{reply}");
        assert_eq!(s.memory().state(), ConversationState::LocationInquiry);
        assert_eq!(s.memory().turns()[0].action, Some(Action::AskFollowup));
    }
}

#[tokio::test]
async fn unknown_region_apologises_without_state_change() {
    let engine = engine();
    let mut s = engine.new_session();
    let reply = say(&engine, &mut s, "Do you have outlets in Johor Bahru?").await;
    assert_eq!(reply, "I'm sorry, we don't have any outlets in Johor Bahru at the moment.");
    assert_eq!(s.memory().state(), ConversationState::Initial);
}

#[tokio::test]
async fn detail_before_outlet_asks_which_outlet() {
    let engine = engine();
    let mut s = engine.new_session();
    let reply = say(&engine, &mut s, "What time does the outlet open?").await;
    assert_eq!(reply, "I'm sorry, I need to know which outlet you're asking about first.");
    assert_eq!(s.memory().state(), ConversationState::LocationInquiry);
}

#[tokio::test]
async fn empty_input_is_logged_but_changes_nothing() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "Is there an outlet in Petaling Jaya?").await;
    let before = s.memory().context().clone();

    let reply = say(&engine, &mut s, "  \t ").await;
    assert!(reply.starts_with("I didn't catch that"));
    assert_eq!(s.memory().state(), ConversationState::OutletSelection);
    assert_eq!(s.memory().context(), &before);
    assert_eq!(s.memory().turns().len(), 2);
}

#[tokio::test]
async fn calculations_and_goodbye_count() {
    let engine = engine();
    let mut s = engine.new_session();

    assert_eq!(say(&engine, &mut s, "What is 5 + 3?").await, "The result is: 8");
    assert_eq!(say(&engine, &mut s, "Calculate (5 + 3) * 2").await, "The result is: 16");
    assert_eq!(say(&engine, &mut s, "15 / 3").await, "The result is: 5");
    assert_eq!(
        say(&engine, &mut s, "10 / 0").await,
        "Sorry, I couldn't calculate that: Division by zero is not allowed"
    );
    assert_eq!(s.memory().calculations().len(), 3);
    assert_eq!(s.memory().tool_calls(), 3);
    assert_eq!(s.memory().turns()[3].tool_result, None);

    let reply = say(&engine, &mut s, "bye").await;
    assert_eq!(reply, "Goodbye! I made 3 tool calls for you this session. Have a great day!");
    assert_eq!(s.memory().state(), ConversationState::Completed);
}

#[tokio::test]
async fn plain_closing_after_calculations_reports_tool_calls() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "What is 5 + 3?").await;
    say(&engine, &mut s, "15 / 3").await;

    let reply = say(&engine, &mut s, "ok great").await;
    assert!(reply.contains("I made 2 tool calls for you this session"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::Completed);
    let last = s.memory().turns().last().unwrap();
    assert_eq!(last.action, Some(Action::Finish));
    assert_eq!(last.state, ConversationState::Completed);
}

#[tokio::test]
async fn incomplete_expression_waits_for_clarification() {
    let engine = engine();
    let mut s = engine.new_session();
    let reply = say(&engine, &mut s, "Can you calculate something for me?").await;
    assert!(reply.starts_with("Could you provide a complete mathematical expression?"));
    assert_eq!(s.memory().state(), ConversationState::WaitingForClarification);

    assert_eq!(say(&engine, &mut s, "7 times 6").await, "The result is: 42");
    assert_eq!(s.memory().state(), ConversationState::Processing);
}

#[tokio::test]
async fn product_questions() {
    let engine = engine();
    let mut s = engine.new_session();
    let reply = say(&engine, &mut s, "Do you sell tumblers?").await;
    assert!(reply.starts_with("Here's what I found about tumblers:"), "{reply}");

    let reply = say(&engine, &mut s, "Show products").await;
    assert!(reply.starts_with("What specific drinkware are you looking for?"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::WaitingForClarification);
}

#[tokio::test]
async fn calculation_inside_outlet_flow_goes_to_planner() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "Is there an outlet in Petaling Jaya?").await;
    assert_eq!(say(&engine, &mut s, "What is 2 + 2?").await, "The result is: 4");
    assert_eq!(s.memory().state(), ConversationState::Processing);
}

#[tokio::test]
async fn completed_is_soft_terminal() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "goodbye").await;
    assert_eq!(s.memory().state(), ConversationState::Completed);

    let reply = say(&engine, &mut s, "hello").await;
    assert!(reply.starts_with("Hello!"), "{reply}");
    assert_eq!(s.memory().state(), ConversationState::Completed);

    assert_eq!(say(&engine, &mut s, "What is 1 + 1?").await, "The result is: 2");
    assert_eq!(s.memory().state(), ConversationState::Processing);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let engine = engine();
    let mut a = engine.new_session();
    let mut b = engine.new_session();
    assert_ne!(a.id(), b.id());

    say(&engine, &mut a, "Is there an outlet in Petaling Jaya?").await;
    let reply = say(&engine, &mut b, "SS 2").await;
    assert!(reply.contains("SS 2 Outlet"), "{reply}");

    assert_eq!(a.memory().state(), ConversationState::OutletSelection);
    assert_eq!(a.memory().selected_outlet(), None);
    assert_eq!(b.memory().state(), ConversationState::InformationRequest);
    assert_eq!(a.memory().turns().len(), 1);
    assert_eq!(b.memory().turns().len(), 1);
}

#[tokio::test]
async fn restore_heals_corrupted_state() {
    let engine = engine();
    let export: SessionExport = serde_json::from_value(json!({
        "session_id": "20260101_000000_deadbeef",
        "turns": [],
        "final_state": "half_way_somewhere",
        "context": { "inquiry_location": "petaling_jaya" },
    }))
    .unwrap();

    let mut s = Session::restore(export);
    assert_eq!(s.id(), "20260101_000000_deadbeef");
    assert_eq!(s.memory().state(), ConversationState::Initial);

    let reply = say(&engine, &mut s, "hi").await;
    assert!(reply.starts_with("Hello!"), "{reply}");
    assert_eq!(s.memory().turns().len(), 1);
}

#[tokio::test]
async fn export_roundtrip_resumes_conversation() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "Is there an outlet in Petaling Jaya?").await;

    let json = serde_json::to_string(&s.export()).unwrap();
    let mut resumed = Session::restore(serde_json::from_str(&json).unwrap());
    let reply = say(&engine, &mut resumed, "the central one").await;
    assert!(reply.contains("PJ Central Outlet"), "{reply}");
    let ids: Vec<u32> = resumed.memory().turns().iter().map(|t| t.turn_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn reset_starts_over() {
    let engine = engine();
    let mut s = engine.new_session();
    say(&engine, &mut s, "Any outlets in KL?").await;
    let old_id = s.id().to_owned();

    engine.reset(&mut s);
    let summary = engine.summary(&s);
    assert_ne!(summary.session_id, old_id);
    assert_eq!(summary.state, ConversationState::Initial);
    assert_eq!(summary.turn_count, 0);
    assert!(summary.context.is_empty());
}

#[tokio::test]
async fn turn_ids_are_gapless_and_flow_is_recorded() {
    let engine = engine();
    let mut s = engine.new_session();
    for text in ["hi", "", "Is there an outlet in Petaling Jaya?", "PJ Central", "bye"] {
        say(&engine, &mut s, text).await;
    }
    let ids: Vec<u32> = s.memory().turns().iter().map(|t| t.turn_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let debug = engine.debug_summary(&s);
    assert_eq!(debug.total_turns, 5);
    assert_eq!(debug.last_user_input.as_deref(), Some("bye"));
    assert_eq!(
        debug.conversation_flow,
        vec![
            ConversationState::Completed,
            ConversationState::Completed,
            ConversationState::OutletSelection,
            ConversationState::InformationRequest,
            ConversationState::Completed,
        ]
    );
}

#[tokio::test]
async fn long_input_stays_fast() {
    let engine = engine();
    let mut s = engine.new_session();
    for input in ["a".repeat(10_000), "5+".repeat(5_000), "x".repeat(40_000)] {
        let start = Instant::now();
        let reply = say(&engine, &mut s, &input).await;
        assert!(!reply.is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

#[tokio::test]
async fn transient_tool_failures_are_retried() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Err(ToolError::Server { status: 503 }),
        Err(ToolError::Connection("reset by peer".into())),
        Ok(8.0),
    ]));
    let engine = Engine::new(fast_cfg(), Catalog::builtin(), backend.clone()).unwrap();
    let mut s = engine.new_session();

    assert_eq!(say(&engine, &mut s, "5 + 3").await, "The result is: 8");
    assert_eq!(backend.calls(), 3);
    assert_eq!(s.memory().tool_calls(), 1);
}

#[tokio::test]
async fn terminal_tool_failure_surfaces_once() {
    let backend = Arc::new(ScriptedBackend::always(Err(ToolError::Rejected(
        "Invalid expression".into(),
    ))));
    let engine = Engine::new(fast_cfg(), Catalog::builtin(), backend.clone()).unwrap();
    let mut s = engine.new_session();

    let reply = say(&engine, &mut s, "5 + 3").await;
    assert_eq!(reply, "Sorry, I couldn't calculate that: Calculation error: Invalid expression");
    assert_eq!(backend.calls(), 1);
    assert!(s.memory().calculations().is_empty());
}

#[tokio::test]
async fn unavailable_tool_is_reported() {
    let backend = Arc::new(ScriptedBackend::always(Ok(8.0)).unhealthy());
    let engine = Engine::new(fast_cfg(), Catalog::builtin(), backend.clone()).unwrap();
    let mut s = engine.new_session();

    let reply = say(&engine, &mut s, "What is 5 + 3?").await;
    assert!(reply.contains("Calculator service is not available"), "{reply}");
    assert_eq!(backend.calls(), 0);
}
