//! QA tests for the encounter state machine.
//!
//! All dice are scripted, so every scenario is deterministic.
//! Run with: `cargo test -p adventure-core --test qa_combat`

use adventure_core::character::{CharacterBuilder, Party};
use adventure_core::combat::{
    CombatOutcome, Encounter, EncounterError, EncounterState, SpellEffect, TurnAdvance,
};
use adventure_core::dice::DiceEngine;
use adventure_core::testing::{sample_fighter, sample_wizard, ScriptedDice};

fn scripted(values: impl IntoIterator<Item = u32>) -> DiceEngine {
    DiceEngine::with_source(ScriptedDice::new(values))
}

// =============================================================================
// TEST 1: Starting an encounter
// =============================================================================

#[test]
fn test_start_one_player_one_enemy() {
    let player = CharacterBuilder::new()
        .name("Aria")
        .max_health(10)
        .armor_class(15)
        .build()
        .expect("valid character");

    let mut encounter = Encounter::new("Roadside");
    encounter.add_player(&player).expect("idle encounter accepts players");
    encounter.add_enemy("Goblin", 7, 12).expect("idle encounter accepts enemies");
    encounter.start(&mut DiceEngine::seeded(7)).expect("roster is not empty");

    assert_eq!(encounter.turn_order_len(), 2);
    assert_eq!(encounter.round(), 1);
    assert!(encounter.is_active());
    assert_eq!(encounter.state(), EncounterState::Active);
}

#[test]
fn test_empty_encounter_cannot_start() {
    let mut encounter = Encounter::new("Nobody");
    let err = encounter.start(&mut DiceEngine::seeded(1)).unwrap_err();
    assert_eq!(err, EncounterError::NoCombatants);
    assert_eq!(encounter.round(), 0);
}

#[test]
fn test_initiative_logged_before_order() {
    let mut encounter = Encounter::new("Log Check");
    encounter.add_enemy("Wolf", 11, 13).unwrap();
    encounter.add_enemy("Bandit", 11, 12).unwrap();
    encounter.start(&mut scripted([9, 9])).unwrap();

    let lines: Vec<String> = encounter.combat_log(10).iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "[Round 0] Wolf rolled 9 for initiative",
            "[Round 0] Bandit rolled 9 for initiative",
            "[Round 0] Initiative order: Wolf (9), Bandit (9)",
            "[Round 1] Combat started: Log Check",
        ]
    );
}

// =============================================================================
// TEST 2: Rounds and turn order
// =============================================================================

#[test]
fn test_full_cycle_advances_one_round_and_prunes_fallen() {
    let mut encounter = Encounter::new("Crypt");
    let hero = encounter.add_player(&sample_fighter("Hero")).unwrap();
    let skeleton = encounter.add_enemy_from_template("skeleton", None).unwrap();
    encounter.add_enemy_from_template("skeleton", None).unwrap();
    let mut dice = scripted([15, 12, 8, 20, 20]);
    encounter.start(&mut dice).unwrap();

    // Hero kills the first skeleton: 20 to hit, 20 clamps to 6 on the d6, +2.
    let outcome = encounter
        .attack(&mut dice, hero, skeleton, "1d6+2")
        .expect("valid combatants");
    assert_eq!(outcome.damage, 8);
    let outcome = encounter.attack(&mut dice, hero, skeleton, "1d6+2").unwrap();
    assert!(outcome.target_unconscious);

    let before = encounter.round();
    let len = encounter.turn_order_len();
    for _ in 0..len {
        encounter.next_turn();
    }

    assert_eq!(encounter.round(), before + 1);
    assert_eq!(encounter.turn_order_len(), 2);
    assert_eq!(encounter.roster().len(), 3);
    assert!(encounter.turn_order().all(|c| c.conscious));
}

#[test]
fn test_current_combatant_follows_turns() {
    let mut encounter = Encounter::new("Turns");
    encounter.add_enemy("A", 5, 10).unwrap();
    encounter.add_enemy("B", 5, 10).unwrap();
    encounter.add_player(&sample_fighter("C")).unwrap();
    assert!(encounter.current_combatant().is_none());

    encounter.start(&mut scripted([3, 17, 11])).unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(encounter.current_combatant().map(|c| c.name.clone()).unwrap());
        encounter.next_turn();
    }
    assert_eq!(seen, vec!["B", "C", "A"]);
    assert_eq!(encounter.current_combatant().unwrap().name, "B");
}

// =============================================================================
// TEST 3: Ending combat and syncing characters
// =============================================================================

#[test]
fn test_victory_syncs_character() {
    let mut party = Party::new();
    let fighter = sample_fighter("Brom");
    let id = party.insert(fighter.clone());

    let mut encounter = Encounter::new("Bridge");
    let brom = encounter.add_player(&fighter).unwrap();
    let bandit = encounter.add_enemy_from_template("bandit", None).unwrap();
    // Initiative 12/10; bandit hits Brom for 5; Brom drops the bandit.
    let mut dice = scripted([12, 10, 18, 4, 20, 6, 20, 6]);
    encounter.start(&mut dice).unwrap();

    encounter.attack(&mut dice, bandit, brom, "1d6+1").unwrap();
    encounter.attack(&mut dice, brom, bandit, "1d6").unwrap();
    encounter.attack(&mut dice, brom, bandit, "1d6").unwrap();
    assert!(encounter.should_end_combat());

    assert_eq!(party.get(id).unwrap().health(), 12, "no live sync during combat");

    let resolution = encounter.end_combat().expect("first end succeeds");
    assert_eq!(resolution.outcome, CombatOutcome::Victory);
    assert!(!encounter.is_active());
    resolution.apply(&mut party);
    assert_eq!(party.get(id).unwrap().health(), 7);

    assert_eq!(encounter.end_combat().unwrap_err(), EncounterError::AlreadyEnded);
    assert_eq!(encounter.next_turn(), TurnAdvance::Inactive);
}

#[test]
fn test_defeat_ends_on_round_wrap() {
    let mut encounter = Encounter::new("Ogre Cave");
    let hero = encounter.add_player(&sample_wizard("Mira")).unwrap();
    let ogre = encounter.add_enemy_from_template("ogre", None).unwrap();
    let mut dice = scripted([2, 19, 20, 8, 8]);
    encounter.start(&mut dice).unwrap();

    let outcome = encounter.attack(&mut dice, ogre, hero, "2d8+4").unwrap();
    assert!(outcome.target_unconscious);

    assert_eq!(encounter.next_turn(), TurnAdvance::Next);
    match encounter.next_turn() {
        TurnAdvance::Ended(resolution) => {
            assert_eq!(resolution.outcome, CombatOutcome::Defeat);
            assert_eq!(resolution.syncs.len(), 1);
            assert_eq!(resolution.syncs[0].health, 0);
        }
        other => panic!("expected defeat, got {:?}", other),
    }
    assert_eq!(
        encounter.combat_log(1)[0].text,
        "Defeat! All players have fallen unconscious!"
    );
}

// =============================================================================
// TEST 4: Spells
// =============================================================================

#[test]
fn test_healing_revives_unconscious_ally() {
    let mut encounter = Encounter::new("Field Hospital");
    let cleric = encounter.add_player(&sample_wizard("Sana")).unwrap();
    let ally = encounter.add_npc("Guard", 10, 14).unwrap();
    encounter.add_enemy("Cultist", 9, 12).unwrap();
    let mut dice = scripted([10, 9, 8, 10, 3]);
    encounter.start(&mut dice).unwrap();

    let burn = SpellEffect::Damage { damage: "1d10".into() };
    encounter.cast_spell(&mut dice, cleric, "Toll the Dead", &[ally], &burn).unwrap();
    assert!(!encounter.combatant(ally).unwrap().conscious);

    let heal = SpellEffect::Healing { healing: "1d4".into() };
    let outcome = encounter.cast_spell(&mut dice, cleric, "Cure Wounds", &[ally], &heal).unwrap();
    assert_eq!(outcome.effects[0].amount, 3);
    assert!(encounter.combatant(ally).unwrap().conscious);
    assert_eq!(encounter.combatant(ally).unwrap().health, 3);
}

#[test]
fn test_unconscious_caster_fails_softly() {
    let mut encounter = Encounter::new("Quiet");
    let caster = encounter.add_enemy("Acolyte", 0, 10).unwrap();
    let target = encounter.add_player(&sample_fighter("Tam")).unwrap();
    let mut dice = scripted([10]);
    encounter.start(&mut dice).unwrap();

    let effect = SpellEffect::Damage { damage: "1d8".into() };
    let outcome = encounter
        .cast_spell(&mut dice, caster, "Sacred Flame", &[target], &effect)
        .expect("soft failure is not an error");
    assert!(outcome.error.is_some());
    assert!(outcome.effects.is_empty());
}
