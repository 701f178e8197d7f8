use anyhow::Result;

use crate::config::{load_masking_rules, load_tagging_rules, Config};

pub fn list_rules(config: &Config) -> Result<()> {
    let masking = load_masking_rules(&config.masking)?;
    let tagging = load_tagging_rules(&config.tagging)?;

    let state = if config.masking.enabled { "" } else { " (disabled)" };
    println!("masking rules: {}{}", masking.len(), state);
    println!("{:<24} {:<10} TOKEN", "NAME", "KIND");
    for rule in masking.rules() {
        println!("{:<24} {:<10} {}", rule.name, rule.kind, rule.kind.token());
    }

    println!();
    println!(
        "tagging rules: {} (max_tags={}, max_categories={})",
        tagging.rules().len(),
        config.tagging.max_tags,
        config.tagging.max_categories
    );
    println!(
        "{:<16} {:>8} {:<20} {:<20} MATCHER",
        "ID", "PRIORITY", "TAG", "CATEGORY"
    );
    for rule in tagging.rules() {
        println!(
            "{:<16} {:>8} {:<20} {:<20} {}",
            rule.id,
            rule.priority,
            rule.tag.as_deref().unwrap_or("-"),
            rule.category.as_deref().unwrap_or("-"),
            rule.matcher_summary()
        );
    }

    Ok(())
}
