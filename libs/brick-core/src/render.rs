//! Config-file and email-template rendering
//!
//! Templates reference `{{ brick.* }}` and `{{ brickconfig.* }}` fields;
//! references are substituted in place and unknown references are left
//! untouched so a bad template degrades visibly instead of silently.

use std::collections::BTreeMap;

use crate::models::{Brick, BrickConfig, ConfigFile};

/// Render a template against a flattened context map.
pub fn render_template(template: &str, context: &BTreeMap<String, String>) -> String {
    let re = regex::Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap();

    re.replace_all(template, |caps: &regex::Captures| {
        let path = &caps[1];
        match context.get(path) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Flatten (brick, brickconfig) into the template context.
pub fn brick_context(brick: &Brick, brickconfig: &BrickConfig) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();

    context.insert("brick.uuid".to_string(), brick.id.to_string());
    context.insert("brick.tenant_id".to_string(), brick.tenant_id.clone());
    context.insert("brick.status".to_string(), brick.status.to_string());
    if let Some(ref instance_id) = brick.instance_id {
        context.insert("brick.instance_id".to_string(), instance_id.clone());
    }
    for (key, value) in &brick.configuration {
        let rendered = match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        };
        context.insert(format!("brick.config.{}", key), rendered);
    }

    context.insert("brickconfig.name".to_string(), brickconfig.name.clone());
    context.insert("brickconfig.version".to_string(), brickconfig.version.clone());
    context.insert("brickconfig.tag".to_string(), brickconfig.tag.clone());
    context.insert(
        "brickconfig.app_version".to_string(),
        brickconfig.app_version.clone(),
    );
    context.insert(
        "brickconfig.description".to_string(),
        brickconfig.description.clone(),
    );
    for entry in brickconfig.sorted_environ() {
        context.insert(format!("environ.{}", entry.name), entry.value.clone());
    }

    context
}

/// Render one config file against its brick and brickconfig.
pub fn render_config_file(file: &ConfigFile, brick: &Brick, brickconfig: &BrickConfig) -> String {
    render_template(&file.contents, &brick_context(brick, brickconfig))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::states::BrickStatus;

    use super::*;

    fn test_brick(brickconfig_uuid: Uuid) -> Brick {
        Brick {
            id: Uuid::new_v4(),
            brickconfig_uuid,
            tenant_id: "iamatenant".to_string(),
            instance_id: Some("inst-1".to_string()),
            status: BrickStatus::Init,
            configuration: [(
                "flavour".to_string(),
                serde_json::Value::String("m1.small".to_string()),
            )]
            .into_iter()
            .collect(),
            deploy_log: String::new(),
            deployed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_brickconfig() -> BrickConfig {
        BrickConfig {
            id: Uuid::new_v4(),
            name: "abrickconfig".to_string(),
            version: "v0.0".to_string(),
            is_public: false,
            tenant_id: "iamatenant".to_string(),
            tag: "testapp".to_string(),
            description: "i am a test app".to_string(),
            logo: String::new(),
            app_version: "10.2.9".to_string(),
            ports: vec![],
            environ: vec![],
            email_template: String::new(),
            minimum_ram_mb: 512,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_brickconfig_name() {
        let brickconfig = test_brickconfig();
        let brick = test_brick(brickconfig.id);
        let file = ConfigFile {
            id: Uuid::new_v4(),
            brickconfig_uuid: brickconfig.id,
            name: "Dockerfile".to_string(),
            description: String::new(),
            contents: "ENV: {{ brickconfig.name }}".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(
            render_config_file(&file, &brick, &brickconfig),
            "ENV: abrickconfig"
        );
    }

    #[test]
    fn test_render_configuration_and_instance() {
        let brickconfig = test_brickconfig();
        let brick = test_brick(brickconfig.id);
        let context = brick_context(&brick, &brickconfig);

        assert_eq!(
            render_template("{{ brick.config.flavour }} on {{ brick.instance_id }}", &context),
            "m1.small on inst-1"
        );
    }

    #[test]
    fn test_unknown_reference_is_left_in_place() {
        let brickconfig = test_brickconfig();
        let brick = test_brick(brickconfig.id);
        let context = brick_context(&brick, &brickconfig);

        assert_eq!(
            render_template("{{ no.such.field }}", &context),
            "{{ no.such.field }}"
        );
    }
}
