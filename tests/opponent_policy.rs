//! Autonomous opponent tests: move selection rates, activation on the
//! opponent's turn, pre-emption by a manual move, and cancellation

use duel_engine::battle::{
    decide_action, Action, ActionKind, BattleConfig, BattlePhase, BattleSession, NarrativeReply,
    PolicyState, PolicyTuning,
};
use duel_engine::core::{AttackAbility, Combatant, HealingAbility, Slot};
use duel_engine::dice::{DiceExpr, ScriptedDice};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::time::Duration;
use tokio::time::Instant;

const DELAY: Duration = Duration::from_millis(800);

fn hero() -> Combatant {
    Combatant::new("Hero", 20, 14)
        .with_attack_bonus(3)
        .with_melee_damage(DiceExpr::new(1, 8, 0))
}

fn troll() -> Combatant {
    Combatant::new("Troll", 30, 13)
        .with_attack_bonus(4)
        .with_melee_damage(DiceExpr::new(2, 6, 0))
}

fn heal_rate(combatant: &Combatant, seed: u64) -> f64 {
    let tuning = PolicyTuning::default();
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    let trials = 10_000;
    let heals = (0..trials)
        .filter(|_| {
            let kind = decide_action(combatant, &tuning, &mut rng);
            matches!(kind, ActionKind::Ability(i)
                if combatant.ability(i).is_some_and(|a| a.is_healing()))
        })
        .count();
    heals as f64 / trials as f64
}

#[test]
fn test_low_hp_heals_about_thirty_percent() {
    let wounded = troll()
        .with_ability(HealingAbility::new("Regenerate", DiceExpr::new(2, 8, 0)))
        .with_hit_points(6);
    assert_eq!(wounded.hp_fraction(), 0.2);
    let rate = heal_rate(&wounded, 6);
    assert!((rate - 0.3).abs() < 0.02, "heal rate {rate}");
}

#[test]
fn test_heal_rate_steps_with_hp() {
    let base = troll().with_ability(HealingAbility::new("Regenerate", DiceExpr::new(2, 8, 0)));
    let bloodied = heal_rate(&base.clone().with_hit_points(12), 7);
    let healthy = heal_rate(&base.with_hit_points(30), 8);
    assert!((bloodied - 0.2).abs() < 0.02, "bloodied heal rate {bloodied}");
    assert!((healthy - 0.1).abs() < 0.02, "healthy heal rate {healthy}");
}

#[test]
fn test_heal_skipped_falls_through_to_attacks() {
    let brawler = troll()
        .with_ability(HealingAbility::new("Regenerate", DiceExpr::new(2, 8, 0)))
        .with_ability(AttackAbility::new("Rend", DiceExpr::new(2, 6, 2)));
    let tuning = PolicyTuning::default();
    let mut rng = ChaCha12Rng::seed_from_u64(9);
    let mut seen_rend = false;
    let mut seen_basic = false;
    for _ in 0..500 {
        match decide_action(&brawler, &tuning, &mut rng) {
            ActionKind::Ability(1) => seen_rend = true,
            ActionKind::BasicAttack => seen_basic = true,
            _ => {}
        }
    }
    assert!(seen_rend && seen_basic);
}

/// Primary manual, opponent autonomous, opening narration done
fn battle(faces: &[u32]) -> (BattleSession, Instant) {
    let now = Instant::now();
    let config = BattleConfig::default().with_opponent_delay(DELAY);
    let mut session =
        BattleSession::new(config, 3).with_dice(ScriptedDice::new(faces.iter().copied()));
    session.assign(Slot::Primary, hero()).unwrap();
    session.assign(Slot::Opponent, troll()).unwrap();
    session.start().unwrap();
    let opening = session.drain_narrative_requests().pop().unwrap();
    session.complete_narrative(opening.id, NarrativeReply::fallback(&opening), now);
    (session, now)
}

fn deliver_all(session: &mut BattleSession, now: Instant) {
    for effect in session.drain_effects() {
        for callback in effect.into_callbacks() {
            session.fire_callback(callback, now);
        }
    }
}

#[test]
fn test_policy_waits_then_acts() {
    // hero hits for 6, troll hits for 2+3
    let (mut session, now) = battle(&[15, 6, 18, 2, 3]);
    assert_eq!(session.policy_state(Slot::Opponent), Some(PolicyState::Idle));

    session
        .submit(Slot::Primary, Action::basic_attack(), now)
        .unwrap();
    assert_eq!(session.next_deadline(), None, "no delay while the hero's move is in flight");
    deliver_all(&mut session, now);

    assert_eq!(session.active_slot(), Slot::Opponent);
    assert_eq!(session.next_deadline(), Some(now + DELAY));
    assert_eq!(session.poll(now + DELAY / 2), None);
    assert!(!session.is_move_in_flight());

    let acted = session.poll(now + DELAY).unwrap();
    assert_eq!(session.pending_action(), Some(acted));
    assert_eq!(
        session.policy_state(Slot::Opponent),
        Some(PolicyState::Committed)
    );

    deliver_all(&mut session, now + DELAY);
    assert_eq!(session.policy_state(Slot::Opponent), Some(PolicyState::Idle));
    assert_eq!(session.active_slot(), Slot::Primary);
    assert_eq!(session.combatant(Slot::Primary).unwrap().hit_points(), 15);
    assert_eq!(session.next_deadline(), None);
}

#[test]
fn test_manual_move_preempts_pending_delay() {
    let (mut session, now) = battle(&[15, 6, 2]);
    session
        .submit(Slot::Primary, Action::basic_attack(), now)
        .unwrap();
    deliver_all(&mut session, now);
    assert!(matches!(
        session.policy_state(Slot::Opponent),
        Some(PolicyState::DelayPending { .. })
    ));

    // Someone moves for the troll before its delay runs out
    let manual = session
        .submit(
            Slot::Opponent,
            Action::basic_attack(),
            now + Duration::from_millis(100),
        )
        .unwrap();

    // The delay expires with that move still in flight
    assert_eq!(session.poll(now + DELAY), None);
    assert_eq!(session.policy_state(Slot::Opponent), Some(PolicyState::Idle));
    assert_eq!(session.pending_action(), Some(manual));

    deliver_all(&mut session, now + DELAY);
    assert_eq!(session.actions_taken(), 2);
    assert_eq!(session.active_slot(), Slot::Primary);
    assert_eq!(session.next_deadline(), None);
}

#[test]
fn test_reset_cancels_pending_delay() {
    let (mut session, now) = battle(&[15, 6]);
    session
        .submit(Slot::Primary, Action::basic_attack(), now)
        .unwrap();
    deliver_all(&mut session, now);
    assert!(session.next_deadline().is_some());

    session.reset();
    assert_eq!(session.phase(), BattlePhase::Setup);
    assert_eq!(session.next_deadline(), None);
    assert_eq!(session.policy_state(Slot::Opponent), Some(PolicyState::Idle));
    assert_eq!(session.poll(now + DELAY * 2), None);
    assert_eq!(session.actions_taken(), 0);
}

#[test]
fn test_defeat_cancels_every_delay() {
    // Hero kills a 1 HP opponent; nobody is left waiting
    let now = Instant::now();
    let mut session =
        BattleSession::new(BattleConfig::default(), 4).with_dice(ScriptedDice::new([20, 8]));
    session.assign(Slot::Primary, hero()).unwrap();
    session
        .assign(Slot::Opponent, Combatant::new("Imp", 1, 10))
        .unwrap();
    session.start().unwrap();
    let opening = session.drain_narrative_requests().pop().unwrap();
    session.complete_narrative(opening.id, NarrativeReply::fallback(&opening), now);

    session
        .submit(Slot::Primary, Action::basic_attack(), now)
        .unwrap();
    deliver_all(&mut session, now);
    assert_eq!(session.phase(), BattlePhase::Concluded);
    assert_eq!(session.next_deadline(), None);
    assert_eq!(session.poll(now + DELAY), None);
}
