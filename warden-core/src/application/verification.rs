// warden-core/src/application/verification.rs

// Fix Validator: samples live data to check that a claimed protection is observable.
// Read-only and time-boxed. Anything that prevents a verdict counts as "not verified".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::domain::dialect::Dialect;
use crate::domain::ports::CatalogMetadata;
use crate::domain::protection::{
    ColumnRef, ProtectionSettings, ProtectionVerificationResult, evaluate_encryption, evaluate_masking,
};
use crate::domain::quality::DataSourceDescriptor;
use crate::domain::quality::classify::as_text;
use crate::ports::connector::ConnectorResolver;

pub struct FixValidator {
    resolver: Arc<dyn ConnectorResolver>,
    sources: HashMap<String, DataSourceDescriptor>,
    catalog: Arc<dyn CatalogMetadata>,
    settings: ProtectionSettings,
}

/// `SELECT col FROM t WHERE col IS NOT NULL ORDER BY <random> LIMIT n` in the source's idiom.
pub fn sample_sql(column: &ColumnRef, dialect: Dialect, size: u64) -> String {
    let col = dialect.quote_ident(&column.column);
    let from = format!(
        "{} WHERE {} IS NOT NULL ORDER BY {}",
        dialect.qualified_table(column.schema.as_deref(), &column.table),
        col,
        dialect.random_function()
    );
    dialect.select_limited(&col, &from, size.max(1))
}

impl FixValidator {
    pub fn new(
        resolver: Arc<dyn ConnectorResolver>,
        sources: Vec<DataSourceDescriptor>,
        catalog: Arc<dyn CatalogMetadata>,
        settings: ProtectionSettings,
    ) -> Self {
        Self {
            resolver,
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
            catalog,
            settings,
        }
    }

    pub fn settings(&self) -> &ProtectionSettings {
        &self.settings
    }

    /// `verify(columnDescriptor, requiresEncryption, requiresMasking)`
    #[instrument(skip(self), fields(column = %column))]
    pub async fn verify(
        &self,
        column: &ColumnRef,
        requires_encryption: bool,
        requires_masking: bool,
    ) -> ProtectionVerificationResult {
        if !requires_encryption && !requires_masking {
            return ProtectionVerificationResult::verified("no protection required");
        }

        let mut verdicts = Vec::new();
        if requires_encryption {
            verdicts.push(match self.sample(column).await {
                Ok(values) => evaluate_encryption(&values, &self.settings),
                Err(reason) => {
                    warn!("Encryption verification indeterminate: {}", reason);
                    ProtectionVerificationResult::failed(
                        format!("encryption could not be verified: {}", reason),
                        vec![],
                    )
                }
            });
        }
        if requires_masking {
            verdicts.push(match self.catalog.column_masking(column) {
                Ok(masking) => evaluate_masking(masking.as_ref()),
                Err(e) => ProtectionVerificationResult::failed(
                    format!("masking could not be verified: {}", e),
                    vec![],
                ),
            });
        }

        let verdict = verdicts
            .into_iter()
            .reduce(ProtectionVerificationResult::and)
            .unwrap_or_else(|| ProtectionVerificationResult::verified("no protection required"));
        info!(verified = verdict.is_verified, "{}", verdict.reason);
        verdict
    }

    /// Non-null values of the live column, rendered as text.
    async fn sample(&self, column: &ColumnRef) -> Result<Vec<String>, String> {
        let source = self
            .sources
            .get(&column.source)
            .ok_or_else(|| format!("data source '{}' is not configured", column.source))?;
        let sql = sample_sql(column, source.dialect(), self.settings.sample_size);
        debug!("🔎 Sampling: {}", sql);

        let connector = self.resolver.resolve(source).map_err(|e| e.to_string())?;
        let timeout = Duration::from_secs(self.settings.sample_timeout_secs.max(1));
        let output = tokio::time::timeout(timeout, connector.query(&sql))
            .await
            .map_err(|_| format!("sampling exceeded {}s", timeout.as_secs()))?
            .map_err(|e| e.to_string())?;

        Ok(output.column_values(0).filter_map(as_text).collect())
    }
}
