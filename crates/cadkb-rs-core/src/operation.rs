//! Typed parameter shapes for known automation operations, tag derivation,
//! and the context summary that gets embedded.

use cadkb_rs_store::OperationParameters;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the automation operations the executor knows about.
///
/// Anything else is recorded through the free-form `OperationParameters` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", rename_all = "snake_case")]
pub enum KnownOperation {
    OpenModel {
        file_path: String,
    },
    ModifyDimension {
        feature_name: String,
        dimension_name: String,
        value: f64,
    },
    ExportModel {
        output_path: String,
        format: String,
    },
    RunMacro {
        macro_path: String,
        #[serde(default)]
        macro_name: Option<String>,
    },
    UpdateDesignTable {
        table_name: String,
        #[serde(default)]
        configuration: Option<String>,
        value_count: i64,
    },
    SetCustomProperty {
        property_name: String,
        value: String,
        #[serde(default)]
        configuration: Option<String>,
    },
    ActivateConfiguration {
        configuration_name: String,
    },
    CreateDrawing {
        template_path: String,
    },
    RebuildModel {
        #[serde(default)]
        force: bool,
    },
}

impl KnownOperation {
    /// Operation type tag stored on the record.
    pub fn operation_type(&self) -> &'static str {
        match self {
            KnownOperation::OpenModel { .. } => "open_model",
            KnownOperation::ModifyDimension { .. } => "modify_dimension",
            KnownOperation::ExportModel { .. } => "export_model",
            KnownOperation::RunMacro { .. } => "run_macro",
            KnownOperation::UpdateDesignTable { .. } => "update_design_table",
            KnownOperation::SetCustomProperty { .. } => "set_custom_property",
            KnownOperation::ActivateConfiguration { .. } => "activate_configuration",
            KnownOperation::CreateDrawing { .. } => "create_drawing",
            KnownOperation::RebuildModel { .. } => "rebuild_model",
        }
    }

    /// Flatten into the stored parameter map.
    pub fn parameters(&self) -> OperationParameters {
        let mut params = OperationParameters::new();
        match self {
            KnownOperation::OpenModel { file_path } => {
                params.insert("file_path", file_path.as_str());
            }
            KnownOperation::ModifyDimension {
                feature_name,
                dimension_name,
                value,
            } => {
                params.insert("feature_name", feature_name.as_str());
                params.insert("dimension_name", dimension_name.as_str());
                params.insert("value", *value);
            }
            KnownOperation::ExportModel {
                output_path,
                format,
            } => {
                params.insert("output_path", output_path.as_str());
                params.insert("format", format.to_uppercase());
            }
            KnownOperation::RunMacro {
                macro_path,
                macro_name,
            } => {
                params.insert("macro_path", macro_path.as_str());
                if let Some(name) = macro_name {
                    params.insert("macro_name", name.as_str());
                }
            }
            KnownOperation::UpdateDesignTable {
                table_name,
                configuration,
                value_count,
            } => {
                params.insert("table_name", table_name.as_str());
                if let Some(configuration) = configuration {
                    params.insert("configuration", configuration.as_str());
                }
                params.insert("value_count", *value_count);
            }
            KnownOperation::SetCustomProperty {
                property_name,
                value,
                configuration,
            } => {
                params.insert("property_name", property_name.as_str());
                params.insert("value", value.as_str());
                if let Some(configuration) = configuration {
                    params.insert("configuration", configuration.as_str());
                }
            }
            KnownOperation::ActivateConfiguration { configuration_name } => {
                params.insert("configuration_name", configuration_name.as_str());
            }
            KnownOperation::CreateDrawing { template_path } => {
                params.insert("template_path", template_path.as_str());
            }
            KnownOperation::RebuildModel { force } => {
                params.insert("force", *force);
            }
        }
        params
    }

    pub fn into_parts(self) -> (String, OperationParameters) {
        (self.operation_type().to_string(), self.parameters())
    }
}

/// Labels attached to a record: the type itself, a category, and the CAD
/// file kind when a `file_path` parameter names one.
pub fn derive_tags(operation_type: &str, parameters: &OperationParameters) -> Vec<String> {
    let mut tags = vec![operation_type.to_string()];
    if let Some(kind) = parameters.get_text("file_path").and_then(file_kind) {
        tags.push(kind.to_string());
    }
    if let Some(category) = category(operation_type) {
        tags.push(category.to_string());
    }
    tags.dedup();
    tags
}

fn file_kind(path: &str) -> Option<&'static str> {
    let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "sldprt" => Some("part"),
        "sldasm" => Some("assembly"),
        "slddrw" => Some("drawing"),
        _ => None,
    }
}

fn category(operation_type: &str) -> Option<&'static str> {
    match operation_type {
        "modify_dimension" | "update_design_table" => Some("parametric"),
        "export_model" | "take_screenshot" => Some("export"),
        "run_macro" => Some("automation"),
        "activate_configuration" | "set_custom_property" => Some("configuration"),
        "create_drawing" => Some("drawing"),
        _ => None,
    }
}

/// Text embedded for a record: type, parameters in key order, tags, outcome.
pub fn context_summary(
    operation_type: &str,
    parameters: &OperationParameters,
    tags: &[String],
    success: bool,
    error_message: Option<&str>,
) -> String {
    let mut summary = format!("operation: {operation_type}");
    if !parameters.is_empty() {
        let rendered = parameters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        summary.push_str(&format!("; parameters: {rendered}"));
    }
    if !tags.is_empty() {
        summary.push_str(&format!("; tags: {}", tags.join(", ")));
    }
    match (success, error_message) {
        (true, _) => summary.push_str("; outcome: succeeded"),
        (false, Some(message)) => summary.push_str(&format!("; outcome: failed ({message})")),
        (false, None) => summary.push_str("; outcome: failed"),
    }
    summary
}

/// Text embedded for an error solution, and for queries against them.
pub fn error_summary(error_message: &str, context: &OperationParameters) -> String {
    let mut summary = format!("error: {error_message}");
    if !context.is_empty() {
        let rendered = context
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        summary.push_str(&format!("; context: {rendered}"));
    }
    summary
}
