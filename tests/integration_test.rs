use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use trust_or_doubt::config::ServerConfig;
use trust_or_doubt::protocol::{ClientMessage, ServerMessage};
use trust_or_doubt::questions::{Blocklist, QuestionRequest, QuestionSource};
use trust_or_doubt::state::{reconnect, AppState};
use trust_or_doubt::types::*;
use trust_or_doubt::ws::handlers::handle_message;

/// Deterministic question source: every question's correct answer is "1"
#[derive(Default)]
struct FixedQuestions {
    next: AtomicUsize,
    /// Hand out at most this many per call
    limit: Option<usize>,
}

#[async_trait]
impl QuestionSource for FixedQuestions {
    async fn get_questions(&self, request: QuestionRequest) -> Vec<Question> {
        let count = self.limit.map_or(request.count, |l| l.min(request.count));
        (0..count)
            .map(|_| {
                let n = self.next.fetch_add(1, Ordering::SeqCst);
                Question {
                    id: format!("fixed-{}", n),
                    question: format!("Fixed question number {}?", n),
                    options: vec![
                        "Zero".to_string(),
                        "One".to_string(),
                        "Two".to_string(),
                        "Three".to_string(),
                    ],
                    correct_index: 1,
                    category: "General Knowledge".to_string(),
                    difficulty: Difficulty::Easy,
                    reported: false,
                }
            })
            .collect()
    }
}

fn test_state() -> Arc<AppState> {
    Arc::new(AppState::new(
        ServerConfig::default(),
        Arc::new(FixedQuestions::default()),
        Arc::new(Blocklist::in_memory()),
    ))
}

/// A fake socket: a hub registration plus its outbound queue
struct Client {
    id: String,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn connect(state: &AppState, id: &str) -> Self {
        Self {
            id: id.to_string(),
            rx: state.hub.register(id),
        }
    }

    async fn send(&self, state: &Arc<AppState>, msg: ClientMessage) -> Option<ServerMessage> {
        handle_message(msg, &self.id, state).await
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Most recent match snapshot among queued broadcasts
    fn latest(&mut self) -> Match {
        self.drain()
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::MatchUpdated { snapshot }
                | ServerMessage::MatchStarted { snapshot }
                | ServerMessage::MatchPaused { snapshot }
                | ServerMessage::MatchResumed { snapshot } => Some(snapshot),
                _ => None,
            })
            .last()
            .expect("Expected a match snapshot broadcast")
    }
}

fn error_code(reply: Option<ServerMessage>) -> String {
    match reply {
        Some(ServerMessage::Error { code, .. }) => code,
        other => panic!("Expected error, got {:?}", other),
    }
}

struct Lobby {
    match_id: MatchId,
    alice: Client,
    bob: Client,
    alice_token: String,
    bob_token: String,
}

async fn create_and_join(state: &Arc<AppState>) -> Lobby {
    let alice = Client::connect(state, "conn-alice");
    let bob = Client::connect(state, "conn-bob");

    let (match_id, alice_token) = match alice
        .send(
            state,
            ClientMessage::CreateMatch {
                player_name: "Alice".to_string(),
                settings: MatchSettings::default(),
            },
        )
        .await
    {
        Some(ServerMessage::MatchCreated {
            match_id,
            reconnect_token,
            ..
        }) => (match_id, reconnect_token),
        other => panic!("Expected MatchCreated, got {:?}", other),
    };

    let bob_token = match bob
        .send(
            state,
            ClientMessage::JoinMatch {
                match_id: match_id.to_lowercase(),
                player_name: "Bob".to_string(),
            },
        )
        .await
    {
        Some(ServerMessage::JoinedMatch {
            reconnect_token, ..
        }) => reconnect_token,
        other => panic!("Expected JoinedMatch, got {:?}", other),
    };

    Lobby {
        match_id,
        alice,
        bob,
        alice_token,
        bob_token,
    }
}

/// Alice hosts and challenges, Bob moderates, first question is up
async fn start_playing(state: &Arc<AppState>) -> Lobby {
    let mut lobby = create_and_join(state).await;
    let reply = lobby
        .alice
        .send(
            state,
            ClientMessage::ChooseRole {
                match_id: lobby.match_id.clone(),
                choice: RoleChoice::Challenger,
            },
        )
        .await;
    assert!(reply.is_none());
    let reply = lobby
        .alice
        .send(
            state,
            ClientMessage::StartMatch {
                match_id: lobby.match_id.clone(),
            },
        )
        .await;
    assert!(reply.is_none());
    lobby.alice.drain();
    lobby.bob.drain();
    lobby
}

async fn answer_both(state: &Arc<AppState>, lobby: &Lobby, challenger: &str, moderator: &str) {
    for (client, answer) in [(&lobby.alice, challenger), (&lobby.bob, moderator)] {
        let reply = client
            .send(
                state,
                ClientMessage::SubmitAnswer {
                    match_id: lobby.match_id.clone(),
                    answer: answer.to_string(),
                },
            )
            .await;
        assert!(reply.is_none(), "Unexpected reply: {:?}", reply);
    }
}

async fn decide(state: &Arc<AppState>, lobby: &Lobby, decision: Decision) {
    let reply = lobby
        .alice
        .send(
            state,
            ClientMessage::MakeDecision {
                match_id: lobby.match_id.clone(),
                decision,
            },
        )
        .await;
    assert!(reply.is_none(), "Unexpected reply: {:?}", reply);
}

async fn next_round(state: &Arc<AppState>, lobby: &Lobby) -> Option<ServerMessage> {
    lobby
        .bob
        .send(
            state,
            ClientMessage::NextRound {
                match_id: lobby.match_id.clone(),
            },
        )
        .await
}

#[tokio::test]
async fn test_create_match() {
    let state = test_state();
    let alice = Client::connect(&state, "conn-alice");

    let reply = alice
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "Alice".to_string(),
                settings: MatchSettings::default(),
            },
        )
        .await;

    match reply {
        Some(ServerMessage::MatchCreated {
            match_id,
            snapshot,
            session_id,
            reconnect_token,
        }) => {
            assert_eq!(match_id.len(), 6);
            assert!(match_id
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            assert_eq!(snapshot.state, MatchState::Lobby);
            assert!((1..=3).contains(&snapshot.challenger_coins));
            assert_eq!(snapshot.initial_coins, snapshot.challenger_coins);
            assert_eq!(snapshot.questions.len(), 30);
            assert_eq!(snapshot.players.len(), 1);
            assert!(snapshot.players[0].is_host());
            assert!(!session_id.is_empty());
            assert_ne!(session_id, reconnect_token);
        }
        other => panic!("Expected MatchCreated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_join_and_role_selection() {
    let state = test_state();
    let mut lobby = create_and_join(&state).await;

    let snapshot = lobby.alice.latest();
    assert_eq!(snapshot.players.len(), 2);
    assert_eq!(snapshot.state, MatchState::RoleSelection);
    assert_eq!(lobby.bob.latest().version, snapshot.version);

    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::ChooseRole {
                match_id: lobby.match_id.clone(),
                choice: RoleChoice::Random,
            },
        )
        .await;
    assert!(reply.is_none());

    let m = lobby.bob.latest();
    assert_eq!(m.state, MatchState::Setup);
    let challengers = m
        .players
        .iter()
        .filter(|p| p.game_role == Some(GameRole::Challenger))
        .count();
    let moderators = m
        .players
        .iter()
        .filter(|p| p.game_role == Some(GameRole::Moderator))
        .count();
    assert_eq!((challengers, moderators), (1, 1));
    assert_ne!(m.challenger_name, m.moderator_name);
}

#[tokio::test]
async fn test_only_host_chooses_roles_and_starts() {
    let state = test_state();
    let lobby = create_and_join(&state).await;

    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::ChooseRole {
                match_id: lobby.match_id.clone(),
                choice: RoleChoice::Challenger,
            },
        )
        .await;
    assert_eq!(error_code(reply), "UNAUTHORIZED");

    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::StartMatch {
                match_id: lobby.match_id.clone(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_start_match() {
    let state = test_state();
    let mut lobby = create_and_join(&state).await;
    lobby.alice.drain();

    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::StartMatch {
                match_id: lobby.match_id.clone(),
            },
        )
        .await;
    assert!(reply.is_none());

    let started = lobby
        .bob
        .drain()
        .into_iter()
        .find_map(|msg| match msg {
            ServerMessage::MatchStarted { snapshot } => Some(snapshot),
            _ => None,
        })
        .expect("Expected MatchStarted");
    assert_eq!(started.state, MatchState::Playing);
    assert_eq!(started.phase, RoundPhase::Answering);
    assert_eq!(started.current_question, 0);
    // Started straight from role selection: roles were drawn
    assert!(started.challenger_id.is_some());
    assert!(started.moderator_id.is_some());
}

#[tokio::test]
async fn test_both_answers_move_to_decision_atomically() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;

    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "1".to_string(),
            },
        )
        .await;
    assert!(reply.is_none());
    let after_one = lobby.bob.latest();
    assert!(after_one.round.challenger_answered);
    assert!(!after_one.round.moderator_answered);
    assert_eq!(after_one.phase, RoundPhase::Answering);
    assert_eq!(after_one.challenger_score, 0);

    lobby
        .bob
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "2".to_string(),
            },
        )
        .await;

    // Exactly one broadcast for the second answer, already in decision
    let updates: Vec<Match> = lobby
        .alice
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::MatchUpdated { snapshot } => Some(snapshot),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 2);
    let m = &updates[1];
    assert!(m.round.challenger_answered && m.round.moderator_answered);
    assert!(m.round.challenger_correct);
    assert_eq!(m.challenger_score, 1);
    assert_eq!(m.phase, RoundPhase::Decision);
}

#[tokio::test]
async fn test_doubt_against_wrong_moderator_keeps_coin() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;
    answer_both(&state, &lobby, "1", "2").await;
    let before = lobby.alice.latest();

    decide(&state, &lobby, Decision::Doubt).await;
    let m = lobby.alice.latest();
    assert_eq!(m.phase, RoundPhase::Result);
    assert_eq!(m.challenger_coins, before.challenger_coins);
    assert_eq!(m.moderator_score, before.moderator_score);
    assert_eq!(m.round.outcome, Some(RoundOutcome::DoubtCoinSaved));
    assert!(m.round.round_result.contains("retained"));
    assert!(m.round.show_moderator_answer);
}

#[tokio::test]
async fn test_trust_hides_moderator_answer() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;
    answer_both(&state, &lobby, "0", "3").await;

    decide(&state, &lobby, Decision::Trust).await;
    let m = lobby.bob.latest();
    assert_eq!(m.moderator_score, 1);
    assert_eq!(m.challenger_score, 0);
    assert!(!m.round.show_moderator_answer);
    assert_eq!(m.round.outcome, Some(RoundOutcome::TrustAwarded));
}

#[tokio::test]
async fn test_moderator_cannot_decide() {
    let state = test_state();
    let lobby = start_playing(&state).await;
    answer_both(&state, &lobby, "1", "1").await;

    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::MakeDecision {
                match_id: lobby.match_id.clone(),
                decision: Decision::Trust,
            },
        )
        .await;
    assert_eq!(error_code(reply), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_running_out_of_coins_ends_match() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;
    let initial_coins = state
        .registry
        .get_match(&lobby.match_id)
        .await
        .unwrap()
        .challenger_coins;

    let mut rounds = 0;
    loop {
        // Moderator is right every time, so every doubt costs a coin
        answer_both(&state, &lobby, "0", "1").await;
        decide(&state, &lobby, Decision::Doubt).await;
        rounds += 1;

        let m = lobby.alice.latest();
        assert_eq!(m.round.outcome, Some(RoundOutcome::DoubtCoinLost));
        assert!(m.round.round_result.contains("lost"));
        assert_eq!(m.challenger_coins, initial_coins - rounds);

        assert!(next_round(&state, &lobby).await.is_none());
        let m = lobby.alice.latest();
        if m.challenger_coins <= 0 {
            assert_eq!(m.state, MatchState::Finished);
            assert_eq!(
                m.winner,
                Some(Winner::Player {
                    name: "Bob".to_string()
                })
            );
            break;
        }
        assert_eq!(m.state, MatchState::Playing);
        assert_eq!(m.phase, RoundPhase::Answering);
        assert_eq!(m.current_question, rounds as usize);
        assert_eq!(m.round, RoundState::default());
    }
    assert_eq!(rounds, initial_coins);

    // Nothing moves once finished
    let reply = next_round(&state, &lobby).await;
    assert_eq!(error_code(reply), "WRONG_STATE");
}

#[tokio::test]
async fn test_disconnect_pauses_and_reconnect_resumes() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;

    reconnect::disconnect(&state, &lobby.alice.id).await;
    let messages = lobby.bob.drain();
    assert!(messages.iter().any(|msg| matches!(
        msg,
        ServerMessage::PlayerDisconnected { player_name } if player_name == "Alice"
    )));
    let paused = messages
        .into_iter()
        .find_map(|msg| match msg {
            ServerMessage::MatchPaused { snapshot } => Some(snapshot),
            _ => None,
        })
        .expect("Expected MatchPaused");
    assert_eq!(paused.state, MatchState::Paused);

    // Actions are refused while paused
    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "1".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "WRONG_STATE");

    let alice2 = Client::connect(&state, "conn-alice-2");
    let reply = alice2
        .send(
            &state,
            ClientMessage::ReconnectAttempt {
                reconnect_token: lobby.alice_token.clone(),
            },
        )
        .await;
    match reply {
        Some(ServerMessage::ReconnectSuccess {
            match_id,
            player_name,
            is_host,
            game_role,
            snapshot,
            ..
        }) => {
            assert_eq!(match_id, lobby.match_id);
            assert_eq!(player_name, "Alice");
            assert!(is_host);
            assert_eq!(game_role, Some(GameRole::Challenger));
            assert_eq!(snapshot.state, MatchState::Playing);
            let alice = snapshot.player_by_name("Alice").unwrap();
            assert!(alice.connected);
            assert_eq!(alice.id, "conn-alice-2");
            assert_eq!(snapshot.challenger_name.as_deref(), Some("Alice"));
            assert_eq!(snapshot.moderator_name.as_deref(), Some("Bob"));
        }
        other => panic!("Expected ReconnectSuccess, got {:?}", other),
    }

    let messages = lobby.bob.drain();
    assert!(messages
        .iter()
        .any(|msg| matches!(msg, ServerMessage::MatchResumed { .. })));
    assert!(messages.iter().any(|msg| matches!(
        msg,
        ServerMessage::PlayerReconnected { player_name } if player_name == "Alice"
    )));

    // The new connection plays on
    let reply = alice2
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "1".to_string(),
            },
        )
        .await;
    assert!(reply.is_none());
    assert!(lobby.bob.latest().round.challenger_answered);
}

#[tokio::test]
async fn test_reconnect_with_unknown_token_clears_credentials() {
    let state = test_state();
    let stranger = Client::connect(&state, "conn-stranger");
    let reply = stranger
        .send(
            &state,
            ClientMessage::ReconnectAttempt {
                reconnect_token: "deadbeef".to_string(),
            },
        )
        .await;
    assert!(matches!(
        reply,
        Some(ServerMessage::ReconnectFailed {
            clear_credentials: true,
            ..
        })
    ));
}

#[tokio::test]
async fn test_full_match_rejects_third_player() {
    let state = test_state();
    let lobby = create_and_join(&state).await;
    let before = state.registry.get_match(&lobby.match_id).await.unwrap();

    let carol = Client::connect(&state, "conn-carol");
    let reply = carol
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: lobby.match_id.clone(),
                player_name: "Carol".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "MATCH_FULL");

    let after = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(after.players, before.players);
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn test_rejoin_by_name_revokes_old_token() {
    let state = test_state();
    let lobby = start_playing(&state).await;

    let bob2 = Client::connect(&state, "conn-bob-2");
    let reply = bob2
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: lobby.match_id.clone(),
                player_name: "Bob".to_string(),
            },
        )
        .await;
    let new_token = match reply {
        Some(ServerMessage::JoinedMatch {
            role,
            is_host,
            game_role,
            reconnect_token,
            ..
        }) => {
            assert_eq!(role, SeatRole::Player2);
            assert!(!is_host);
            assert_eq!(game_role, Some(GameRole::Moderator));
            reconnect_token
        }
        other => panic!("Expected JoinedMatch, got {:?}", other),
    };
    assert_ne!(new_token, lobby.bob_token);

    let m = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(m.moderator_id.as_deref(), Some("conn-bob-2"));
    assert_eq!(m.players.len(), 2);

    let reply = Client::connect(&state, "conn-thief")
        .send(
            &state,
            ClientMessage::ReconnectAttempt {
                reconnect_token: lobby.bob_token.clone(),
            },
        )
        .await;
    assert!(matches!(reply, Some(ServerMessage::ReconnectFailed { .. })));
}

#[tokio::test]
async fn test_stale_connection_is_ignored() {
    let state = test_state();
    let lobby = start_playing(&state).await;
    let before = state.registry.get_match(&lobby.match_id).await.unwrap();

    let stranger = Client::connect(&state, "conn-stranger");
    let reply = stranger
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "1".to_string(),
            },
        )
        .await;
    assert!(reply.is_none());

    // Once both answered, a late answer is refused without touching state
    answer_both(&state, &lobby, "1", "1").await;
    let mid = state.registry.get_match(&lobby.match_id).await.unwrap();
    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "0".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "WRONG_STATE");

    let after = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(after.version, mid.version);
    assert!(mid.version > before.version);
}

#[tokio::test]
async fn test_cancel_skip_without_request_is_noop() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;
    let before = state.registry.get_match(&lobby.match_id).await.unwrap();

    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::CancelSkip {
                match_id: lobby.match_id.clone(),
            },
        )
        .await;
    assert!(reply.is_none());
    assert!(lobby.alice.drain().is_empty());

    let after = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_skip_needs_both_players() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;
    let first = state
        .registry
        .get_match(&lobby.match_id)
        .await
        .unwrap()
        .question()
        .unwrap()
        .id
        .clone();

    lobby
        .alice
        .send(
            &state,
            ClientMessage::RequestSkip {
                match_id: lobby.match_id.clone(),
                reason: Some("ambiguous".to_string()),
            },
        )
        .await;
    let m = lobby.bob.latest();
    assert_eq!(m.round.skip_requests, vec!["Alice".to_string()]);
    assert_eq!(m.current_question, 0);

    lobby
        .bob
        .send(
            &state,
            ClientMessage::RequestSkip {
                match_id: lobby.match_id.clone(),
                reason: None,
            },
        )
        .await;
    let messages = lobby.alice.drain();
    assert!(messages.iter().any(|msg| matches!(
        msg,
        ServerMessage::QuestionReported { question_id, rolled_back: false } if *question_id == first
    )));

    let m = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(m.current_question, 1);
    assert_eq!(m.phase, RoundPhase::Answering);
    assert!(m.questions[0].reported);
    assert!(m.round.skip_requests.is_empty());
    assert!(state.blocklist.is_blocked(&first).await);
}

#[tokio::test]
async fn test_post_answer_report_rolls_back_points() {
    let state = test_state();
    let lobby = start_playing(&state).await;

    // Challenger right (+1), trust (+1 moderator)
    answer_both(&state, &lobby, "1", "1").await;
    decide(&state, &lobby, Decision::Trust).await;
    let scored = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!((scored.challenger_score, scored.moderator_score), (1, 1));

    for client in [&lobby.alice, &lobby.bob] {
        let reply = client
            .send(
                &state,
                ClientMessage::RequestPostAnswerReport {
                    match_id: lobby.match_id.clone(),
                    reason: Some("wrong answer key".to_string()),
                },
            )
            .await;
        assert!(reply.is_none());
    }

    let m = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!((m.challenger_score, m.moderator_score), (0, 0));
    assert_eq!(m.challenger_coins, scored.challenger_coins);
    assert_eq!(m.current_question, 1);
    assert_eq!(m.phase, RoundPhase::Answering);
    assert!(state.blocklist.is_blocked(&scored.questions[0].id).await);
}

#[tokio::test]
async fn test_report_after_lost_doubt_refunds_coin() {
    let state = test_state();
    let lobby = start_playing(&state).await;

    answer_both(&state, &lobby, "0", "1").await;
    decide(&state, &lobby, Decision::Doubt).await;
    let scored = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(scored.moderator_score, 1);
    assert_eq!(scored.challenger_coins, scored.initial_coins - 1);

    for client in [&lobby.bob, &lobby.alice] {
        client
            .send(
                &state,
                ClientMessage::RequestPostAnswerReport {
                    match_id: lobby.match_id.clone(),
                    reason: None,
                },
            )
            .await;
    }

    let m = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(m.moderator_score, 0);
    assert_eq!(m.challenger_coins, m.initial_coins);
}

#[tokio::test]
async fn test_create_fails_when_questions_run_short() {
    let state = Arc::new(AppState::new(
        ServerConfig::default(),
        Arc::new(FixedQuestions {
            limit: Some(2),
            ..Default::default()
        }),
        Arc::new(Blocklist::in_memory()),
    ));
    let alice = Client::connect(&state, "conn-alice");

    let reply = alice
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "Alice".to_string(),
                settings: MatchSettings {
                    difficulty: Some(Difficulty::Hard),
                    category: Some("Obscure Lichens".to_string()),
                },
            },
        )
        .await;
    match reply {
        Some(ServerMessage::Error { code, message }) => {
            assert_eq!(code, "INSUFFICIENT_QUESTIONS");
            assert!(message.contains("broader"));
        }
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn test_unknown_match_and_bad_input() {
    let state = test_state();
    let lobby = start_playing(&state).await;

    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: "ZZZZZZ".to_string(),
                player_name: "Alice".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "MATCH_NOT_FOUND");

    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                match_id: lobby.match_id.clone(),
                answer: "7".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "VALIDATION_FAILED");

    let reply = lobby
        .alice
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "   ".to_string(),
                settings: MatchSettings::default(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_ping_and_focus_relay() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;

    let reply = lobby
        .alice
        .send(&state, ClientMessage::Ping { ts: Some(42) })
        .await;
    assert!(matches!(
        reply,
        Some(ServerMessage::Pong { ts: Some(42), .. })
    ));
    // Heartbeats are not broadcast
    assert!(lobby.bob.drain().is_empty());

    lobby
        .alice
        .send(
            &state,
            ClientMessage::FocusLost {
                match_id: lobby.match_id.clone(),
            },
        )
        .await;
    let messages = lobby.bob.drain();
    assert!(matches!(
        messages.as_slice(),
        [ServerMessage::OpponentFocus { player_name, focused: false }] if player_name == "Alice"
    ));
    assert!(lobby.alice.drain().is_empty());
}

#[tokio::test]
async fn test_http_routes() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let state = test_state();
    create_and_join(&state).await;
    let app = trust_or_doubt::api::router(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/debug/matches")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let matches: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(matches.as_array().unwrap().len(), 1);
    assert_eq!(matches[0]["players"].as_array().unwrap().len(), 2);
    assert!(!String::from_utf8_lossy(&body).contains("conn-alice"));
}

#[tokio::test]
async fn test_match_outlasts_a_narrow_category() {
    let state = Arc::new(AppState::offline(ServerConfig::default()));
    let alice = Client::connect(&state, "conn-alice");
    let bob = Client::connect(&state, "conn-bob");

    let (match_id, stocked) = match alice
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "Alice".to_string(),
                settings: MatchSettings {
                    difficulty: None,
                    category: Some("Sports".to_string()),
                },
            },
        )
        .await
    {
        Some(ServerMessage::MatchCreated {
            match_id, snapshot, ..
        }) => (match_id, snapshot.questions.len()),
        other => panic!("Expected MatchCreated, got {:?}", other),
    };
    assert!(stocked < 10, "Sports pool should be small, got {}", stocked);

    let reply = bob
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: match_id.clone(),
                player_name: "Bob".to_string(),
            },
        )
        .await;
    assert!(matches!(reply, Some(ServerMessage::JoinedMatch { .. })));
    for msg in [
        ClientMessage::ChooseRole {
            match_id: match_id.clone(),
            choice: RoleChoice::Challenger,
        },
        ClientMessage::StartMatch {
            match_id: match_id.clone(),
        },
    ] {
        assert!(alice.send(&state, msg).await.is_none());
    }
    let lobby = Lobby {
        match_id,
        alice,
        bob,
        alice_token: String::new(),
        bob_token: String::new(),
    };

    // Both miss and the doubt keeps the coin: nobody ever reaches a win
    for round in 0..20 {
        let m = state.registry.get_match(&lobby.match_id).await.unwrap();
        assert_eq!(m.state, MatchState::Playing);
        assert_eq!(m.current_question, round);
        let wrong = ((m.question().unwrap().correct_index + 1) % OPTION_COUNT).to_string();

        answer_both(&state, &lobby, &wrong, &wrong).await;
        decide(&state, &lobby, Decision::Doubt).await;
        let reply = next_round(&state, &lobby).await;
        assert!(reply.is_none(), "Round {} stalled: {:?}", round, reply);
    }

    let m = state.registry.get_match(&lobby.match_id).await.unwrap();
    assert_eq!(m.state, MatchState::Playing);
    assert_eq!(m.current_question, 20);
    assert!(m.current_question > stocked);
    assert_eq!(m.challenger_score + m.moderator_score, 0);
    assert_eq!(m.challenger_coins, m.initial_coins);
    assert!(m.questions.iter().all(|q| q.category == "Sports"));
}

#[tokio::test]
async fn test_host_connection_cannot_take_second_seat() {
    let state = test_state();
    let alice = Client::connect(&state, "conn-alice");
    let match_id = match alice
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "Alice".to_string(),
                settings: MatchSettings::default(),
            },
        )
        .await
    {
        Some(ServerMessage::MatchCreated { match_id, .. }) => match_id,
        other => panic!("Expected MatchCreated, got {:?}", other),
    };

    let reply = alice
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: match_id.clone(),
                player_name: "Bob".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "WRONG_STATE");

    let m = state.registry.get_match(&match_id).await.unwrap();
    assert_eq!(m.players.len(), 1);
    assert_eq!(m.state, MatchState::Lobby);
}

#[tokio::test]
async fn test_seated_player_cannot_open_another_match() {
    let state = test_state();
    let lobby = start_playing(&state).await;

    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "Bob".to_string(),
                settings: MatchSettings::default(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "WRONG_STATE");
    assert_eq!(state.registry.len().await, 1);

    let carol = Client::connect(&state, "conn-carol");
    let other_id = match carol
        .send(
            &state,
            ClientMessage::CreateMatch {
                player_name: "Carol".to_string(),
                settings: MatchSettings::default(),
            },
        )
        .await
    {
        Some(ServerMessage::MatchCreated { match_id, .. }) => match_id,
        other => panic!("Expected MatchCreated, got {:?}", other),
    };
    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: other_id.clone(),
                player_name: "Bob".to_string(),
            },
        )
        .await;
    assert_eq!(error_code(reply), "WRONG_STATE");
    assert_eq!(
        state
            .registry
            .get_match(&other_id)
            .await
            .unwrap()
            .players
            .len(),
        1
    );

    // A finished match no longer holds the seat
    state
        .registry
        .update(
            &lobby.match_id,
            trust_or_doubt::state::MatchPatch {
                state: Some(MatchState::Finished),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let reply = lobby
        .bob
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: other_id.clone(),
                player_name: "Bob".to_string(),
            },
        )
        .await;
    assert!(matches!(reply, Some(ServerMessage::JoinedMatch { .. })));
    assert_eq!(
        state.registry.match_for_connection("conn-bob").await,
        Some(other_id)
    );
}

#[tokio::test]
async fn test_rejoin_by_name_resumes_paused_match() {
    let state = test_state();
    let mut lobby = start_playing(&state).await;

    reconnect::disconnect(&state, &lobby.bob.id).await;
    assert_eq!(
        state
            .registry
            .get_match(&lobby.match_id)
            .await
            .unwrap()
            .state,
        MatchState::Paused
    );
    lobby.alice.drain();

    let bob2 = Client::connect(&state, "conn-bob-2");
    let reply = bob2
        .send(
            &state,
            ClientMessage::JoinMatch {
                match_id: lobby.match_id.clone(),
                player_name: "Bob".to_string(),
            },
        )
        .await;
    assert!(matches!(reply, Some(ServerMessage::JoinedMatch { .. })));

    let messages = lobby.alice.drain();
    let resumed = messages
        .iter()
        .position(|msg| {
            matches!(
                msg,
                ServerMessage::MatchResumed { snapshot } if snapshot.state == MatchState::Playing
            )
        })
        .expect("Expected MatchResumed");
    let updated = messages
        .iter()
        .position(|msg| matches!(msg, ServerMessage::MatchUpdated { .. }))
        .expect("Expected MatchUpdated");
    assert!(resumed < updated);
    assert!(messages.iter().any(|msg| matches!(
        msg,
        ServerMessage::PlayerReconnected { player_name } if player_name == "Bob"
    )));
    assert_eq!(
        state
            .registry
            .get_match(&lobby.match_id)
            .await
            .unwrap()
            .state,
        MatchState::Playing
    );
}
