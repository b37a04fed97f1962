use super::*;
use crate::agent::{skill_efficiency, SkillLedger};

#[test]
fn experience_rolls_over_into_levels() {
    let mut skills = SkillLedger::with_levels(&[(SkillKind::Mechanics, 1)]);
    // Level 1 -> 2 costs 100 * 2.
    skills.add_experience(SkillKind::Mechanics, 250.0, 100.0);
    assert_eq!(skills.level(SkillKind::Mechanics), 2);
    assert!((skills.0[&SkillKind::Mechanics].experience - 50.0).abs() < 1e-9);

    skills.add_experience(SkillKind::Driving, 100.0, 100.0);
    assert_eq!(skills.level(SkillKind::Driving), 1);
    skills.add_experience(SkillKind::Driving, -5.0, 100.0);
    assert_eq!(skills.level(SkillKind::Driving), 1);
}

#[test]
fn unskilled_work_is_slow() {
    assert!(skill_efficiency(0) < skill_efficiency(1));
    assert!(skill_efficiency(3) > skill_efficiency(2));
}

#[test]
fn each_level_past_one_adds_a_fifth() {
    assert!((skill_efficiency(0) - 0.5).abs() < 1e-9);
    assert!((skill_efficiency(1) - 1.0).abs() < 1e-9);
    assert!((skill_efficiency(2) - 1.4).abs() < 1e-9);
    assert!((skill_efficiency(5) - 2.0).abs() < 1e-9);
}

#[test]
fn fatigue_hunger_and_stress_lower_performance() {
    let content = test_content();
    let c = &content.constants;
    let mut condition = PhysicalCondition::default();
    assert!((condition.performance(c) - 1.0).abs() < 1e-9);

    condition.fatigue = 1000.0;
    assert!((condition.performance(c) - 0.6).abs() < 1e-9);
    condition.hunger = 2000.0;
    assert!((condition.performance(c) - 0.1).abs() < 1e-9, "floored at 0.1");
}

#[test]
fn accrual_caps_fatigue_but_not_hunger() {
    let content = test_content();
    let mut condition = PhysicalCondition::default();
    condition.accrue(100_000.0, &content.constants);
    assert!((condition.fatigue - 1000.0).abs() < 1e-9);
    assert!((condition.stress - 1000.0).abs() < 1e-9);
    assert!(condition.hunger > 1000.0);
    assert!(condition.is_starving(&content.constants));
}

#[test]
fn tired_or_hungry_colonists_stay_inside() {
    let content = test_content();
    let mut state = test_state(&content);
    let id = agent(1);
    assert!(state.agents[&id].fit_for_eva(&content.constants));

    state.agents.get_mut(&id).unwrap().condition.as_mut().unwrap().fatigue =
        content.constants.max_eva_fatigue;
    assert!(!state.agents[&id].fit_for_eva(&content.constants));

    let bot = test_fixtures::robot(&mut state, "agent_9000");
    assert!(!state.agents[&bot].fit_for_eva(&content.constants));
    assert!((state.agents[&bot].performance(&content.constants) - 1.0).abs() < 1e-9);
}
