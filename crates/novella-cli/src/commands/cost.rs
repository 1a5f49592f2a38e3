use novella_core::Config;
use novella_ledger::Tariff;
use serde_json::json;

pub fn run(config: &Config, model: &str, linked_chars: u64) -> anyhow::Result<()> {
    println!("{}", quote(&config.tariff, model, linked_chars));
    Ok(())
}

fn quote(tariff: &Tariff, model: &str, linked_chars: u64) -> serde_json::Value {
    json!({
        "model": model,
        "linkedChars": linked_chars,
        "baseCost": tariff.base_cost_for(model),
        "extraCost": tariff.extra_cost(linked_chars),
        "required": tariff.required_amount(model, linked_chars),
    })
}
