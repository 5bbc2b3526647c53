use chat_relay_rs::bot::access::AccessPolicy;
use chat_relay_rs::config::{AccessEntry, Settings};
use proptest::prelude::*;

fn policy_with(user_whitelist: Vec<i64>, user_blacklist: Vec<i64>) -> AccessPolicy {
    let settings = Settings {
        telegram_token: "123456789:TEST".to_string(),
        openai_api_key: "sk-test".to_string(),
        openai_api_base: None,
        chat_model_name: "gpt-4o-mini".to_string(),
        max_tokens: 4096,
        temperature: 0.7,
        image_size: "512x512".to_string(),
        tokens_per_message: 3,
        chat_trigger_regex: "бот,".to_string(),
        image_trigger_regex: "нарисуй".to_string(),
        image_edit_trigger_regex: "измени".to_string(),
        image_vision_trigger_regex: "что на".to_string(),
        group_whitelist: Vec::new(),
        group_blacklist: Vec::new(),
        user_whitelist: user_whitelist.into_iter().map(AccessEntry::Id).collect(),
        user_blacklist: user_blacklist.into_iter().map(AccessEntry::Id).collect(),
        history_dir: "./history".to_string(),
    };
    AccessPolicy::from_settings(&settings)
}

proptest! {
    /// With a non-empty whitelist, blacklist membership never affects the
    /// outcome: only whitelist membership decides.
    #[test]
    fn whitelist_shadows_blacklist(
        whitelist in proptest::collection::vec(0i64..50, 1..8),
        blacklist in proptest::collection::vec(0i64..50, 0..8),
        probe in 0i64..50,
    ) {
        let with_blacklist = policy_with(whitelist.clone(), blacklist);
        let without_blacklist = policy_with(whitelist.clone(), Vec::new());

        prop_assert_eq!(
            with_blacklist.user_allowed(probe, "probe"),
            without_blacklist.user_allowed(probe, "probe"),
            "blacklist changed the outcome for id {}", probe
        );
        prop_assert_eq!(
            with_blacklist.user_allowed(probe, "probe"),
            whitelist.contains(&probe)
        );
    }

    /// Without a whitelist, blacklist membership alone decides; with neither
    /// list everyone is allowed.
    #[test]
    fn blacklist_applies_only_without_whitelist(
        blacklist in proptest::collection::vec(0i64..50, 0..8),
        probe in 0i64..50,
    ) {
        let policy = policy_with(Vec::new(), blacklist.clone());
        prop_assert_eq!(policy.user_allowed(probe, "probe"), !blacklist.contains(&probe));
    }
}
