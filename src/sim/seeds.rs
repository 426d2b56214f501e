//! Built-in starter content for a new campaign.

use crate::sim::achievement::{Achievement, AchievementCategory, AchievementReward, Metric};
use crate::sim::contract::{ContractTemplate, Difficulty};
use crate::sim::expedition::{RouteUnlock, TradeGood, TradeRoute};
use crate::sim::faction::Faction;
use crate::sim::quest::{
    Choice, Effect, ObjectiveKind, QuestDefinition, Requirement, Stage, STAGE_COMPLETE, STAGE_FAIL,
};
use crate::sim::types::{CompareOp, FlagValue};

/// Everything a session needs to know about the world before play starts.
#[derive(Debug, Clone, Default)]
pub struct Content {
    pub factions: Vec<Faction>,
    pub goods: Vec<TradeGood>,
    pub routes: Vec<TradeRoute>,
    pub contracts: Vec<ContractTemplate>,
    pub quests: Vec<QuestDefinition>,
    pub achievements: Vec<Achievement>,
}

impl Content {
    /// The starter world: three factions, eight goods, four routes.
    pub fn standard() -> Self {
        Self {
            factions: seed_factions(),
            goods: seed_goods(),
            routes: seed_routes(),
            contracts: seed_contract_templates(),
            quests: seed_starter_quests(),
            achievements: seed_starter_achievements(),
        }
    }

    pub fn with_quests(mut self, quests: Vec<QuestDefinition>) -> Self {
        self.quests = quests;
        self
    }

    pub fn with_achievements(mut self, achievements: Vec<Achievement>) -> Self {
        self.achievements = achievements;
        self
    }
}

pub fn seed_factions() -> Vec<Faction> {
    vec![
        Faction::new(
            "crown",
            "The Crown",
            "Royal court and navy; grants charters and guards the sea lanes.",
        ),
        Faction::new(
            "guild",
            "Merchants' Guild",
            "Chartered traders who set prices and settle disputes in port.",
        ),
        Faction::new(
            "corsairs",
            "Corsair Brotherhood",
            "Privateers and smugglers who own the southern waters.",
        ),
    ]
}

pub fn seed_goods() -> Vec<TradeGood> {
    vec![
        TradeGood::new("good_pepper", "Pepper", 40),
        TradeGood::new("good_cinnamon", "Cinnamon", 55),
        TradeGood::new("good_silk", "Silk", 80),
        TradeGood::new("good_tea", "Tea", 30),
        TradeGood::new("good_porcelain", "Porcelain", 70),
        TradeGood::new("good_wool", "Wool", 15),
        TradeGood::new("good_timber", "Timber", 10),
        TradeGood::new("good_wine", "Wine", 25),
    ]
}

fn route(
    id: &str,
    name: &str,
    origin: &str,
    destination: &str,
    travel_hours: u64,
    base_risk: f64,
    profit_multiplier: f64,
    faction: &str,
) -> TradeRoute {
    TradeRoute {
        id: id.to_string(),
        name: name.to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        travel_hours,
        base_risk,
        profit_multiplier,
        affinity_goods: Vec::new(),
        faction: faction.to_string(),
        unlock: RouteUnlock::default(),
    }
}

pub fn seed_routes() -> Vec<TradeRoute> {
    let mut levant = route("levant", "Levant Run", "Venice", "Alexandria", 48, 0.08, 1.3, "guild");
    levant.affinity_goods = vec!["good_wine".into(), "good_wool".into()];

    let mut spice = route(
        "spice_islands",
        "Spice Islands Voyage",
        "Lisbon",
        "Malacca",
        96,
        0.20,
        1.6,
        "crown",
    );
    spice.affinity_goods = vec!["good_pepper".into(), "good_cinnamon".into()];

    let mut northern = route(
        "northern_sea",
        "Northern Sea Circuit",
        "Antwerp",
        "Bergen",
        36,
        0.12,
        1.25,
        "guild",
    );
    northern.affinity_goods = vec!["good_timber".into(), "good_wine".into()];
    northern.unlock.min_reputation = Some(10);

    let mut silk = route(
        "silk_road",
        "Silk Road Caravan",
        "Constantinople",
        "Samarkand",
        120,
        0.25,
        1.9,
        "corsairs",
    );
    silk.affinity_goods = vec![
        "good_silk".into(),
        "good_tea".into(),
        "good_porcelain".into(),
    ];
    silk.unlock.rank_token = Some("trade_routes".into());

    vec![levant, spice, northern, silk]
}

fn template(
    id: &str,
    client: &str,
    faction: &str,
    good: &str,
    quantity: u32,
    deadline_hours: u64,
    reward: i64,
    penalty: i64,
    reputation: (i32, i32),
    difficulty: Difficulty,
) -> ContractTemplate {
    ContractTemplate {
        id: id.to_string(),
        client: client.to_string(),
        faction: faction.to_string(),
        good: good.to_string(),
        quantity,
        deadline_hours,
        reward,
        penalty,
        reputation_reward: reputation.0,
        reputation_penalty: reputation.1,
        difficulty,
    }
}

pub fn seed_contract_templates() -> Vec<ContractTemplate> {
    use Difficulty::*;
    vec![
        template("crown_pepper", "Royal Quartermaster", "crown", "good_pepper", 5, 48, 400, 150, (8, 10), Medium),
        template("crown_timber", "Admiralty Shipwright", "crown", "good_timber", 20, 72, 350, 100, (5, 6), Easy),
        template("guild_wool", "Guild Factor", "guild", "good_wool", 15, 48, 300, 80, (4, 5), Easy),
        template("guild_silk", "Guild Master Weaver", "guild", "good_silk", 6, 96, 900, 300, (10, 12), Hard),
        template("guild_wine", "Harbor Tavern", "guild", "good_wine", 8, 36, 260, 60, (3, 4), Easy),
        template("corsair_tea", "Smuggler's Fence", "corsairs", "good_tea", 10, 60, 520, 200, (7, 9), Medium),
        template("corsair_porcelain", "Corsair Captain", "corsairs", "good_porcelain", 4, 72, 640, 250, (9, 12), Hard),
        template("crown_cinnamon", "Palace Kitchens", "crown", "good_cinnamon", 6, 60, 480, 160, (6, 8), Medium),
    ]
}

pub fn seed_starter_quests() -> Vec<QuestDefinition> {
    let crown_envoy = QuestDefinition::new("crown_envoy", "The Governor's Envoy", "npc_governor")
        .with_description("Carry a sealed letter to the harbor fort, or sell it to the highest bidder.")
        .with_faction("crown")
        .with_stage(
            Stage::new("audience", ObjectiveKind::Talk, "npc_governor")
                .with_description("Seek an audience with the Governor"),
        )
        .with_stage(
            Stage::new("the_letter", ObjectiveKind::Talk, "npc_governor")
                .with_description("Decide what to do with the sealed letter")
                .with_choice(
                    Choice::new("carry", "Carry the letter to the fort", "to_the_fort").with_effect(
                        Effect::Item {
                            item: "item_sealed_letter".into(),
                            quantity: 1,
                        },
                    ),
                )
                .with_choice(
                    Choice::new("sell", "Sell the letter to the corsairs", STAGE_FAIL)
                        .with_effect(Effect::Gold { amount: 300 })
                        .with_effect(Effect::Reputation {
                            faction: "corsairs".into(),
                            amount: 15,
                        })
                        .with_effect(Effect::Reputation {
                            faction: "crown".into(),
                            amount: -20,
                        }),
                ),
        )
        .with_stage(
            Stage::new("to_the_fort", ObjectiveKind::Deliver, "item_sealed_letter")
                .with_description("Deliver the letter to the harbor fort")
                .with_effect(Effect::Item {
                    item: "item_sealed_letter".into(),
                    quantity: -1,
                })
                .with_effect(Effect::Flag {
                    flag: "crown_courier".into(),
                    value: FlagValue::Bool(true),
                }),
        )
        .with_reward(Effect::Gold { amount: 250 })
        .with_reward(Effect::Reputation {
            faction: "crown".into(),
            amount: 12,
        })
        .with_time_limit(72);

    let guild_initiation = QuestDefinition::new("guild_initiation", "Guild Initiation", "npc_guildmaster")
        .with_description("Prove your worth to the Merchants' Guild.")
        .with_faction("guild")
        .with_requirement(Requirement::Gold {
            op: CompareOp::Gte,
            value: 200,
        })
        .with_stage(
            Stage::new("buy_wool", ObjectiveKind::Trade, "good_wool")
                .with_description("Trade wool three times at the market")
                .with_quantity(3),
        )
        .with_stage(
            Stage::new("report", ObjectiveKind::Talk, "npc_guildmaster")
                .with_description("Report back to the Guildmaster")
                .with_choice(
                    Choice::new("pay_dues", "Pay the initiation dues", STAGE_COMPLETE)
                        .with_requirement(Requirement::Gold {
                            op: CompareOp::Gte,
                            value: 100,
                        })
                        .with_effect(Effect::Gold { amount: -100 }),
                )
                .with_choice(Choice::new("decline", "Decline membership", STAGE_FAIL)),
        )
        .with_reward(Effect::Reputation {
            faction: "guild".into(),
            amount: 20,
        })
        .with_reward(Effect::Flag {
            flag: "guild_member".into(),
            value: FlagValue::Bool(true),
        });

    let harbor_rounds = QuestDefinition::new("harbor_rounds", "Harbor Rounds", "npc_harbormaster")
        .with_description("Walk the docks and keep watch through the night.")
        .repeatable()
        .with_stage(Stage::new("walk_docks", ObjectiveKind::Travel, "harbor"))
        .with_stage(Stage::new("keep_watch", ObjectiveKind::Wait, "").with_quantity(6))
        .with_reward(Effect::Gold { amount: 40 });

    vec![crown_envoy, guild_initiation, harbor_rounds]
}

pub fn seed_starter_achievements() -> Vec<Achievement> {
    use AchievementCategory::*;
    use Metric::*;

    vec![
        Achievement::new("first_trade", "First Trade", "Complete your first trade", Trading, TradesCompleted, 1)
            .with_reward(AchievementReward::Gold { amount: 25 }),
        Achievement::new("seasoned_trader", "Seasoned Trader", "Complete 100 trades", Trading, TradesCompleted, 100)
            .with_reward(AchievementReward::Capacity { amount: 10 }),
        Achievement::new("profiteer", "Profiteer", "Earn 10,000 gold from sales and ventures", Trading, GoldEarned, 10_000),
        Achievement::new("war_chest", "War Chest", "Hold 5,000 gold at once", Progression, GoldHeld, 5_000),
        Achievement::new("reliable", "Reliable Partner", "Complete 5 contracts", Trading, ContractsCompleted, 5)
            .with_reward(AchievementReward::Reputation { faction: "guild".into(), amount: 5 }),
        Achievement::new("navigator", "Navigator", "Bring home 3 expeditions", Exploration, RoutesCompleted, 3)
            .with_reward(AchievementReward::Skill { skill: "navigation".into(), amount: 1 }),
        Achievement::new("well_connected", "Well Connected", "Meet 10 people", Social, NpcsMet, 10),
        Achievement::new("errand_runner", "Errand Runner", "Complete 3 quests", Social, QuestsCompleted, 3),
        Achievement::new("diplomat", "Diplomat", "Be honored by two factions", Social, FactionHonored, 2)
            .with_reward(AchievementReward::Reputation { faction: "all".into(), amount: 5 }),
        Achievement::new("merchant_prince", "Merchant Prince", "Reach the rank of Merchant Prince", Progression, RankAchieved, 3),
        Achievement::new("old_salt", "Old Salt", "Survive a full year of trading", Special, DaysSurvived, 365).as_hidden(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_quest;
    use std::collections::HashSet;

    #[test]
    fn starter_content_is_consistent() {
        let content = Content::standard();
        let factions: HashSet<&str> = content.factions.iter().map(|f| f.id.as_str()).collect();
        let goods: HashSet<&str> = content.goods.iter().map(|g| g.id.as_str()).collect();

        for template in &content.contracts {
            assert!(factions.contains(template.faction.as_str()), "{}", template.id);
            assert!(goods.contains(template.good.as_str()), "{}", template.id);
        }
        for route in &content.routes {
            assert!(factions.contains(route.faction.as_str()), "{}", route.id);
            assert!(route.affinity_goods.iter().all(|g| goods.contains(g.as_str())));
        }
        for quest in &content.quests {
            validate_quest(quest).unwrap();
        }
    }

    #[test]
    fn achievement_ids_are_unique() {
        let achievements = seed_starter_achievements();
        let ids: HashSet<&str> = achievements.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids.len(), achievements.len());
    }
}
