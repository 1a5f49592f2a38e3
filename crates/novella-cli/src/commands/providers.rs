use novella_core::Config;
use novella_provider::{all_capabilities, ProviderCapabilities};

pub fn run(config: &Config) -> anyhow::Result<()> {
    let factory = config
        .provider_factory()
        .map_err(|e| anyhow::anyhow!("Invalid config: {e}"))?;
    let configured = factory.available();

    println!("Backends ({}):", all_capabilities().len());
    for caps in all_capabilities() {
        let status = if configured.contains(&caps.kind) {
            "configured"
        } else {
            "no key"
        };
        let marker = if caps.kind == factory.default_text() {
            "*"
        } else {
            " "
        };
        println!("{marker} {}", describe(caps, status));
    }

    Ok(())
}

fn describe(caps: &ProviderCapabilities, status: &str) -> String {
    let mut features = Vec::new();
    if caps.supports_streaming {
        features.push("streaming");
    }
    if caps.supports_json_mode {
        features.push("json");
    }
    let image = caps.default_image_model.unwrap_or("-");
    format!(
        "{} [{status}] text={} image={image} ({})",
        caps.name,
        caps.default_text_model,
        features.join(", ")
    )
}
