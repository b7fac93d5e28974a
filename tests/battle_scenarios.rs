//! End-to-end battle scenarios
//!
//! Drives a [`BattleSession`] by hand with scripted dice, playing the
//! renderer's part by returning effect callbacks explicitly, and checks the
//! resulting hit points, log entries, turn order and narrative requests.

use duel_engine::battle::{
    Action, BattleConfig, BattlePhase, BattleSession, Controller, EffectKind, HeadlessDriver,
    Intensity, LogKind, NarrativeKind, NarrativeReply,
};
use duel_engine::core::{AttackAbility, Combatant, HealingAbility, Slot};
use duel_engine::dice::{DiceExpr, ScriptedDice};
use similar_asserts::assert_eq;
use tokio::time::Instant;

fn hero() -> Combatant {
    Combatant::new("Hero", 20, 14)
        .with_attack_bonus(3)
        .with_melee_damage(DiceExpr::new(1, 8, 0))
}

fn brute() -> Combatant {
    Combatant::new("Brute", 20, 16)
        .with_attack_bonus(2)
        .with_melee_damage(DiceExpr::new(1, 6, 0))
}

fn flurry() -> AttackAbility {
    AttackAbility::new("Flurry", DiceExpr::new(1, 8, 0)).with_attacks(3)
}

/// Session with both sides manual and scripted dice, opening narration done
fn manual_battle(
    primary: Combatant,
    opponent: Combatant,
    faces: &[u32],
) -> (BattleSession, Instant) {
    let now = Instant::now();
    let mut session = BattleSession::new(BattleConfig::default(), 5)
        .with_dice(ScriptedDice::new(faces.iter().copied()));
    session.assign(Slot::Primary, primary).unwrap();
    session.assign(Slot::Opponent, opponent).unwrap();
    session
        .set_controller(Slot::Opponent, Controller::Manual)
        .unwrap();
    session.start().unwrap();

    let opening = session.drain_narrative_requests().pop().unwrap();
    assert_eq!(opening.kind, NarrativeKind::Opening);
    assert!(session.complete_narrative(opening.id, NarrativeReply::fallback(&opening), now));
    (session, now)
}

/// Hand back every callback of every outstanding effect
fn deliver_all(session: &mut BattleSession, now: Instant) -> usize {
    let mut fired = 0;
    for effect in session.drain_effects() {
        for callback in effect.into_callbacks() {
            session.fire_callback(callback, now);
            fired += 1;
        }
    }
    fired
}

fn play(session: &mut BattleSession, slot: Slot, action: Action, now: Instant) {
    session.submit(slot, action, now).unwrap();
    deliver_all(session, now);
    assert!(!session.is_move_in_flight(), "gate still held after delivery");
}

fn hp(session: &BattleSession, slot: Slot) -> u32 {
    session.combatant(slot).unwrap().hit_points()
}

#[test]
fn test_basic_attack_hits() {
    let (mut session, now) = manual_battle(hero(), brute(), &[15, 6]);
    session
        .submit(Slot::Primary, Action::basic_attack(), now)
        .unwrap();

    let effects = session.drain_effects();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].kind, EffectKind::Attack);
    assert_eq!(effects[0].intensity, Intensity::Normal);
    for effect in effects {
        for callback in effect.into_callbacks() {
            session.fire_callback(callback, now);
        }
    }

    assert_eq!(hp(&session, Slot::Opponent), 14);
    let hits: Vec<_> = session.log().of_kind(LogKind::Hit).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].actor, Some(Slot::Primary));
    assert_eq!(
        hits[0].message,
        "Hero hits Brute for 6 damage (roll 15+3=18 vs AC 16) (20 → 14 HP)."
    );
    assert_eq!(session.active_slot(), Slot::Opponent);
    assert!(!session.is_move_in_flight());
    assert_eq!(session.queued_narrative().len(), 1);
}

#[test]
fn test_basic_attack_misses() {
    let (mut session, now) = manual_battle(hero(), brute(), &[2]);
    session
        .submit(Slot::Primary, Action::basic_attack(), now)
        .unwrap();

    let mut effects = session.drain_effects();
    assert_eq!(effects.len(), 1);
    let effect = effects.pop().unwrap();
    assert_eq!(effect.kind, EffectKind::Miss);
    assert!(effect.impact.is_none());
    assert!(session.is_move_in_flight());

    session.fire_callback(effect.completion, now);
    assert_eq!(hp(&session, Slot::Opponent), 20);
    let last = session.log().last().unwrap();
    assert_eq!(last.kind, LogKind::Miss);
    assert_eq!(last.actor, Some(Slot::Primary));
    assert_eq!(last.message, "Hero misses Brute (roll 2+3=5 vs AC 16).");
    assert_eq!(session.active_slot(), Slot::Opponent);
}

#[test]
fn test_multi_strike_waits_for_every_landed_impact() {
    let striker = hero().with_ability(flurry());
    let (mut session, now) = manual_battle(striker, brute(), &[15, 5, 15, 7, 2]);
    session.submit(Slot::Primary, Action::ability(0), now).unwrap();

    let effects = session.drain_effects();
    assert_eq!(effects.len(), 3);
    let strikes: Vec<_> = effects.iter().map(|e| e.strike).collect();
    assert_eq!(strikes, vec![Some(0), Some(1), Some(2)]);
    let staggers: Vec<u64> = effects.iter().map(|e| e.key.stagger_ms).collect();
    assert_eq!(staggers, vec![0, 100, 200]);
    assert_eq!(effects[2].kind, EffectKind::Miss);

    let mut impacts = Vec::new();
    let mut completions = Vec::new();
    for effect in effects {
        if let Some(impact) = effect.impact {
            impacts.push(impact);
        }
        completions.push(effect.completion);
    }
    assert_eq!(impacts.len(), 2);

    // Completions alone never release a hit
    let mut completions = completions.into_iter();
    assert!(session.fire_callback(completions.next().unwrap(), now));
    assert!(session.is_move_in_flight());

    let mut impacts = impacts.into_iter();
    session.fire_callback(impacts.next().unwrap(), now);
    assert!(session.is_move_in_flight());
    assert_eq!(hp(&session, Slot::Opponent), 20);

    session.fire_callback(impacts.next().unwrap(), now);
    assert!(!session.is_move_in_flight());
    assert_eq!(hp(&session, Slot::Opponent), 8);
    assert_eq!(session.log().of_kind(LogKind::Hit).count(), 1);
    assert_eq!(
        session.log().last().unwrap().message,
        "Hero unleashes Flurry on Brute: strike 1 hits for 5, strike 2 hits for 7, \
         strike 3 misses. 12 total damage (20 → 8 HP)."
    );

    // Late tokens from the finished action are ignored
    for completion in completions {
        assert!(!session.fire_callback(completion, now));
    }
    assert_eq!(hp(&session, Slot::Opponent), 8);
    assert_eq!(session.actions_taken(), 1);
}

#[test]
fn test_all_miss_multi_strike_logs_once() {
    let striker = hero().with_ability(flurry());
    let (mut session, now) = manual_battle(striker, brute(), &[1, 2, 3]);
    let before = session.log().len();
    session.submit(Slot::Primary, Action::ability(0), now).unwrap();

    let effects = session.drain_effects();
    assert_eq!(effects.len(), 1, "an all-miss action plays a single miss");
    for effect in effects {
        for callback in effect.into_callbacks() {
            session.fire_callback(callback, now);
        }
    }

    assert_eq!(hp(&session, Slot::Opponent), 20);
    assert_eq!(session.log().len(), before + 1);
    let last = session.log().last().unwrap();
    assert_eq!(last.kind, LogKind::Miss);
    assert_eq!(
        last.message,
        "Hero unleashes Flurry on Brute, but every strike misses."
    );
}

#[test]
fn test_killing_blow_lands_at_zero_and_requests_victory() {
    // Hero at 6 HP; the brute's 1d10 rolls 10
    let fragile = Combatant::new("Hero", 6, 14)
        .with_attack_bonus(3)
        .with_melee_damage(DiceExpr::new(1, 8, 0));
    let heavy = brute().with_melee_damage(DiceExpr::new(1, 10, 0));
    let (mut session, now) = manual_battle(fragile, heavy, &[2, 15, 10]);

    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    assert_eq!(session.queued_narrative().len(), 1);

    session
        .submit(Slot::Opponent, Action::basic_attack(), now)
        .unwrap();
    let effects = session.drain_effects();
    assert_eq!(effects[0].intensity, Intensity::Heavy);
    for effect in effects {
        for callback in effect.into_callbacks() {
            session.fire_callback(callback, now);
        }
    }

    assert_eq!(hp(&session, Slot::Primary), 0);
    assert_eq!(session.phase(), BattlePhase::Concluded);
    assert_eq!(session.victor(), Some(Slot::Opponent));
    assert_eq!(session.defeated(), Some(Slot::Primary));
    assert!(session.queued_narrative().is_empty());

    let defeat = session.log().of_kind(LogKind::Defeat).next().unwrap();
    assert_eq!(defeat.message, "Hero is defeated! Brute is victorious.");

    let requests = session.drain_narrative_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].kind, NarrativeKind::Victory);
    assert!(requests[0].text.contains("Hero falls!"));
    assert!(requests[0].text.ends_with("Brute has defeated Hero."));
    assert!(!requests[0].text.contains("Hero misses"));

    assert!(session.complete_narrative(
        requests[0].id,
        NarrativeReply::fallback(&requests[0]),
        now
    ));
    assert_eq!(session.log().last().unwrap().kind, LogKind::Victory);
    assert!(session.invariants_hold());

    let summary = session.summary().unwrap();
    assert!(!summary.party_won());
    assert_eq!(summary.victor_name, "Brute");
    assert_eq!(summary.stats.get(Slot::Opponent).unwrap().damage_dealt, 6);
}

#[test]
fn test_one_hp_defender_lands_at_zero() {
    let minion = Combatant::new("Minion", 1, 10).with_melee_damage(DiceExpr::new(1, 4, 0));
    let (mut session, now) = manual_battle(hero(), minion, &[20, 8]);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    assert_eq!(hp(&session, Slot::Opponent), 0);
    assert_eq!(session.phase(), BattlePhase::Concluded);
    assert!(session
        .log()
        .last()
        .unwrap()
        .message
        .contains("Minion is defeated!"));
}

#[test]
fn test_heal_near_full_caps_at_max() {
    let cleric = hero().with_ability(HealingAbility::new("Mend", DiceExpr::new(2, 8, 0)));
    // hero misses, brute hits for 1, hero heals for 16
    let (mut session, now) = manual_battle(cleric, brute(), &[2, 19, 1, 8, 8]);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    play(&mut session, Slot::Opponent, Action::basic_attack(), now);
    assert_eq!(hp(&session, Slot::Primary), 19);

    play(&mut session, Slot::Primary, Action::ability(0), now);
    assert_eq!(hp(&session, Slot::Primary), 20);
    let heal = session.log().of_kind(LogKind::Heal).next().unwrap();
    assert_eq!(heal.actor, Some(Slot::Primary));
    assert_eq!(heal.message, "Hero uses Mend and recovers 1 HP (19 → 20).");
}

#[test]
fn test_heal_cannot_target_another_slot() {
    let cleric = hero().with_ability(HealingAbility::new("Mend", DiceExpr::new(1, 8, 0)));
    let (mut session, now) = manual_battle(cleric, brute(), &[]);
    let err = session
        .submit(
            Slot::Primary,
            Action::ability(0).with_target(Slot::Opponent),
            now,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        duel_engine::battle::BattleError::InvalidTarget { .. }
    ));
    assert!(!session.is_move_in_flight());
}

#[test]
fn test_round_boundary_flushes_narrative() {
    let (mut session, now) = manual_battle(hero(), brute(), &[15, 6, 2]);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    assert!(session.drain_narrative_requests().is_empty());

    play(&mut session, Slot::Opponent, Action::basic_attack(), now);
    assert!(session.queued_narrative().is_empty());
    assert_eq!(session.round(), 2);
    assert_eq!(session.active_slot(), Slot::Primary);

    let requests = session.drain_narrative_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].kind, NarrativeKind::Round);
    assert_eq!(
        requests[0].text,
        "Hero hits Brute for 6 damage (roll 15+3=18 vs AC 16) (20 → 14 HP). \
         Brute misses Hero (roll 2+2=4 vs AC 14)."
    );
    let system = session.log().last().unwrap();
    assert_eq!(system.kind, LogKind::System);
    assert_eq!(system.message, "Round 2 begins.");
}

#[test]
fn test_victory_supersedes_outstanding_round_narration() {
    let faces = [2, 2, 20, 8, 2, 20, 8, 2, 20, 8];
    let (mut session, now) = manual_battle(hero(), brute(), &faces);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    play(&mut session, Slot::Opponent, Action::basic_attack(), now);
    let round = session.drain_narrative_requests().pop().unwrap();
    assert_eq!(round.kind, NarrativeKind::Round);
    assert!(session.is_waiting_for_narrative());

    // Three 8s drop the brute's 20 HP while its swings keep missing
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    play(&mut session, Slot::Opponent, Action::basic_attack(), now);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    play(&mut session, Slot::Opponent, Action::basic_attack(), now);
    assert_eq!(hp(&session, Slot::Opponent), 4);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);

    assert_eq!(session.phase(), BattlePhase::Concluded);
    let requests = session.drain_narrative_requests();
    assert_eq!(requests.last().unwrap().kind, NarrativeKind::Victory);
    assert!(!session.complete_narrative(round.id, NarrativeReply::fallback(&round), now));
    for request in &requests[..requests.len() - 1] {
        let reply = NarrativeReply::fallback(request);
        assert!(!session.complete_narrative(request.id, reply, now));
    }
    assert!(session.is_waiting_for_narrative());
}

#[test]
fn test_reset_twice_matches_reset_once() {
    let (mut session, now) = manual_battle(hero(), brute(), &[15, 6, 2]);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);
    play(&mut session, Slot::Opponent, Action::basic_attack(), now);

    session.reset();
    let once = session.snapshot();
    session.reset();
    let twice = session.snapshot();
    assert_eq!(once, twice);
    assert_eq!(once.phase, BattlePhase::Setup);
    assert_eq!(once.combatants.get(Slot::Opponent).unwrap().hit_points(), 20);
    assert!(once.log.is_empty());
    assert!(session.invariants_hold());
}

#[test]
fn test_autonomous_battles_always_release_the_gate() {
    for seed in 0..40 {
        let mut session = BattleSession::new(BattleConfig::default(), seed);
        session
            .assign(
                Slot::Primary,
                hero().with_ability(
                    AttackAbility::new("Flurry", DiceExpr::new(1, 6, 0)).with_attacks(3),
                ),
            )
            .unwrap();
        session
            .assign(
                Slot::Support1,
                Combatant::new("Acolyte", 12, 12)
                    .with_ability(HealingAbility::new("Mend", DiceExpr::new(1, 8, 1))),
            )
            .unwrap();
        session
            .assign(
                Slot::Opponent,
                brute().with_ability(AttackAbility::new("Slam", DiceExpr::new(2, 6, 0))),
            )
            .unwrap();
        session.automate_all().unwrap();

        let mut driver = HeadlessDriver::new(session);
        driver.start().unwrap();
        while driver.step().unwrap() {
            let session = driver.session();
            assert!(session.invariants_hold(), "seed {seed}");
            assert!(!session.is_move_in_flight(), "seed {seed}");
        }
        let session = driver.session();
        assert_eq!(session.phase(), BattlePhase::Concluded);
        assert!(session.invariants_hold(), "seed {seed}");
    }
}

#[test]
fn test_same_seed_same_log() {
    let run = |seed: u64| {
        let mut session = BattleSession::new(BattleConfig::default(), seed);
        session.assign(Slot::Primary, hero()).unwrap();
        session.assign(Slot::Opponent, brute()).unwrap();
        session.automate_all().unwrap();
        HeadlessDriver::new(session).run_to_completion().unwrap()
    };
    let a = run(1234);
    let b = run(1234);
    assert_eq!(a.log, b.log);
    assert_eq!(a.victor, b.victor);
}

#[test]
fn test_extreme_modifiers_saturate_instead_of_panicking() {
    let juggernaut = Combatant::new("Juggernaut", 20, 14)
        .with_attack_bonus(i32::MAX)
        .with_melee_damage(DiceExpr::new(1, 6, i32::MAX));
    let (mut session, now) = manual_battle(juggernaut, brute(), &[1, 6]);
    play(&mut session, Slot::Primary, Action::basic_attack(), now);

    assert_eq!(hp(&session, Slot::Opponent), 0);
    assert_eq!(session.phase(), BattlePhase::Concluded);
    assert_eq!(session.victor(), Some(Slot::Primary));
}

#[test]
fn test_strike_count_is_capped() {
    let barrage = AttackAbility::new("Barrage", DiceExpr::new(1, 8, 0)).with_attacks(4_000_000_000);
    let striker = hero().with_ability(barrage);
    let faces = [1; 10];
    let (mut session, now) = manual_battle(striker, brute(), &faces);
    session
        .submit(Slot::Primary, Action::ability(0), now)
        .unwrap();

    let effects = session.drain_effects();
    assert_eq!(effects.len(), 10);
    for effect in effects {
        for callback in effect.into_callbacks() {
            session.fire_callback(callback, now);
        }
    }
    assert_eq!(hp(&session, Slot::Opponent), 10);
    assert!(!session.is_move_in_flight());
}
