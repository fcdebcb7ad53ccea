use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        CreateTemplateInput, ListTemplatesQuery, MAX_PAGE_SIZE, Page, ReportTemplate, ReportType,
        TemplateConfig, TemplateListFilter, UpdateTemplateInput, page_bounds,
    },
    render::builtin_config,
    repository::TemplateRepository,
};

use super::report::parse_opt;

#[derive(Clone)]
pub struct TemplateService {
    templates: Arc<dyn TemplateRepository>,
}

impl TemplateService {
    pub fn new(templates: Arc<dyn TemplateRepository>) -> Self {
        Self { templates }
    }

    #[instrument(name = "template.create", skip(self, input), fields(template_id))]
    pub async fn create_template(
        &self,
        tenant_id: &str,
        user_id: &str,
        input: CreateTemplateInput,
    ) -> AppResult<ReportTemplate> {
        let name = required_name(&input.name)?;
        let report_type: ReportType = input.report_type.parse().map_err(AppError::Validation)?;
        let config = input
            .template
            .unwrap_or_else(|| builtin_config(report_type));
        validate_config(&config)?;
        let metadata = object_or_empty(input.metadata)?;

        let now = Utc::now();
        let template = ReportTemplate {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name,
            report_type,
            description: input.description.unwrap_or_default(),
            template: config,
            is_public: input.is_public,
            is_default: input.is_default,
            created_by: user_id.to_string(),
            created_at: now,
            updated_at: now,
            metadata,
        };

        if template.is_default {
            self.clear_defaults(tenant_id, report_type, template.id).await?;
        }
        self.templates.create(&template).await?;

        tracing::Span::current().record("template_id", template.id.to_string());
        tracing::info!(template_id = %template.id, %report_type, "Template created");
        Ok(template)
    }

    #[instrument(name = "template.get", skip(self))]
    pub async fn get_template(&self, tenant_id: &str, id: Uuid) -> AppResult<ReportTemplate> {
        self.templates
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))
    }

    /// The tenant's own templates plus public ones shared by other tenants.
    #[instrument(name = "template.list", skip(self, query))]
    pub async fn list_templates(
        &self,
        tenant_id: &str,
        query: ListTemplatesQuery,
    ) -> AppResult<Page<ReportTemplate>> {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let filter = TemplateListFilter {
            report_type: parse_opt(query.report_type.as_deref())?,
            is_public: query.is_public,
            is_default: None,
            created_by: query.created_by,
            limit,
            offset,
        };

        let (items, total) = self.templates.list(tenant_id, &filter).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Only the owning tenant may update; a public template seen from another
    /// tenant reads as missing.
    #[instrument(name = "template.update", skip(self, input))]
    pub async fn update_template(
        &self,
        tenant_id: &str,
        id: Uuid,
        input: UpdateTemplateInput,
    ) -> AppResult<ReportTemplate> {
        let mut template = self
            .templates
            .get(tenant_id, id)
            .await?
            .filter(|t| t.tenant_id == tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))?;

        if let Some(name) = input.name {
            template.name = required_name(&name)?;
        }
        if let Some(description) = input.description {
            template.description = description;
        }
        if let Some(config) = input.template {
            validate_config(&config)?;
            template.template = config;
        }
        if let Some(is_public) = input.is_public {
            template.is_public = is_public;
        }
        if let Some(metadata) = input.metadata {
            template.metadata = object_or_empty(Some(metadata))?;
        }
        let becomes_default = input.is_default == Some(true) && !template.is_default;
        if let Some(is_default) = input.is_default {
            template.is_default = is_default;
        }
        template.updated_at = Utc::now();

        if becomes_default {
            self.clear_defaults(tenant_id, template.report_type, template.id)
                .await?;
        }
        if !self.templates.update(&template).await? {
            return Err(AppError::NotFound(format!("Template {id} not found")));
        }

        tracing::info!(template_id = %id, "Template updated");
        Ok(template)
    }

    /// Reports that referenced the template keep their id and stay readable.
    #[instrument(name = "template.delete", skip(self))]
    pub async fn delete_template(&self, tenant_id: &str, id: Uuid) -> AppResult<()> {
        if !self.templates.delete(tenant_id, id).await? {
            return Err(AppError::NotFound(format!("Template {id} not found")));
        }
        tracing::info!(template_id = %id, "Template deleted");
        Ok(())
    }

    /// At most one default per tenant and report type.
    async fn clear_defaults(
        &self,
        tenant_id: &str,
        report_type: ReportType,
        keep: Uuid,
    ) -> AppResult<()> {
        let filter = TemplateListFilter {
            report_type: Some(report_type),
            is_default: Some(true),
            limit: MAX_PAGE_SIZE,
            ..Default::default()
        };
        let (defaults, _) = self.templates.list(tenant_id, &filter).await?;

        for mut previous in defaults
            .into_iter()
            .filter(|t| t.tenant_id == tenant_id && t.id != keep)
        {
            previous.is_default = false;
            previous.updated_at = Utc::now();
            self.templates.update(&previous).await?;
            tracing::debug!(template_id = %previous.id, "Cleared previous default template");
        }
        Ok(())
    }
}

fn required_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    Ok(name.to_string())
}

fn validate_config(config: &TemplateConfig) -> AppResult<()> {
    config
        .validate()
        .map_err(|e| AppError::Validation(format!("invalid template: {e}")))
}

fn object_or_empty(metadata: Option<serde_json::Value>) -> AppResult<serde_json::Value> {
    match metadata {
        None => Ok(serde_json::json!({})),
        Some(value @ serde_json::Value::Object(_)) => Ok(value),
        Some(_) => Err(AppError::Validation(
            "metadata must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SectionConfig, SectionKind};
    use crate::repository::InMemoryTemplateRepository;

    fn service() -> TemplateService {
        TemplateService::new(Arc::new(InMemoryTemplateRepository::new()))
    }

    fn input(name: &str, is_default: bool) -> CreateTemplateInput {
        CreateTemplateInput {
            name: name.to_string(),
            report_type: "compliance_audit".to_string(),
            description: None,
            template: None,
            is_public: false,
            is_default,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_create_uses_builtin_layout_when_omitted() {
        let service = service();
        let template = service.create_template("t1", "u1", input("Audit", false)).await.unwrap();

        assert_eq!(template.template, builtin_config(ReportType::ComplianceAudit));
        assert_eq!(template.metadata, serde_json::json!({}));
        assert_eq!(template.created_by, "u1");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_layout() {
        let service = service();
        let mut request = input("Audit", false);
        request.template = Some(TemplateConfig {
            sections: vec![SectionConfig::new("t", "Table", SectionKind::Table, 0)],
            ..Default::default()
        });
        let err = service.create_template("t1", "u1", request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_single_default_per_type() {
        let service = service();
        let first = service.create_template("t1", "u1", input("First", true)).await.unwrap();
        let second = service.create_template("t1", "u1", input("Second", true)).await.unwrap();

        assert!(!service.get_template("t1", first.id).await.unwrap().is_default);
        assert!(service.get_template("t1", second.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_update_public_template() {
        let service = service();
        let mut request = input("Shared", false);
        request.is_public = true;
        let shared = service.create_template("t1", "u1", request).await.unwrap();

        assert!(service.get_template("t2", shared.id).await.is_ok());
        let update = UpdateTemplateInput {
            name: Some("Hijacked".to_string()),
            ..Default::default()
        };
        let err = service.update_template("t2", shared.id, update).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = service.delete_template("t2", shared.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_applies_partial_changes() {
        let service = service();
        let template = service.create_template("t1", "u1", input("Audit", false)).await.unwrap();
        let update = UpdateTemplateInput {
            description: Some("Quarterly audit pack".to_string()),
            ..Default::default()
        };
        let updated = service.update_template("t1", template.id, update).await.unwrap();

        assert_eq!(updated.name, "Audit");
        assert_eq!(updated.description, "Quarterly audit pack");
        assert!(updated.updated_at >= template.updated_at);
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let service = service();
        let template = service.create_template("t1", "u1", input("Audit", false)).await.unwrap();
        service.delete_template("t1", template.id).await.unwrap();
        let err = service.delete_template("t1", template.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
