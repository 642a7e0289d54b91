/// Crosswalk reconciler
use crate::{
    audit::{AuditEvent, AuditSink, ConsistencyAnomaly},
    config::ReconcileConfig,
    crosswalk::SubjectClaims,
    db::account::{Crosswalk, LocalAccount},
    error::{DuplicateField, LinkError, LinkResult},
    hash,
    identity::{IdentityResolver, ResolutionOutcome},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use uuid::Uuid;

const RECONCILE_EVENT: &str = "crosswalk_reconcile";
const CREATE_EVENT: &str = "crosswalk_create";

/// Post-creation hook for attaching default entitlements to a new account.
///
/// Supplied by the surrounding account-lifecycle system and treated as
/// opaque here. Runs inside the creation transaction: an error rolls the
/// whole account back.
#[async_trait]
pub trait EntitlementHook: Send + Sync {
    async fn on_account_created(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        account: &LocalAccount,
    ) -> LinkResult<()>;
}

/// Hook that attaches nothing.
pub struct NoopEntitlementHook;

#[async_trait]
impl EntitlementHook for NoopEntitlementHook {
    async fn on_account_created(
        &self,
        _tx: &mut Transaction<'_, Sqlite>,
        _account: &LocalAccount,
    ) -> LinkResult<()> {
        Ok(())
    }
}

/// Finds or creates the local account linked to a resolved beneficiary.
pub struct CrosswalkReconciler {
    db: SqlitePool,
    resolver: IdentityResolver,
    audit: Arc<dyn AuditSink>,
    hook: Arc<dyn EntitlementHook>,
    config: ReconcileConfig,
}

impl CrosswalkReconciler {
    pub fn new(
        db: SqlitePool,
        resolver: IdentityResolver,
        audit: Arc<dyn AuditSink>,
        hook: Arc<dyn EntitlementHook>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            db,
            resolver,
            audit,
            hook,
            config,
        }
    }

    /// Reconcile one authentication event against the store.
    ///
    /// Resolver failures propagate unchanged; they are terminal for the
    /// current attempt. A subject with an existing account gets its
    /// crosswalk verified (and backfilled where allowed); an unknown
    /// subject gets an account and crosswalk created in one transaction.
    pub async fn reconcile(&self, claims: &SubjectClaims) -> LinkResult<LocalAccount> {
        if claims.subject_id.trim().is_empty() {
            return Err(self.reject_invalid(claims, "subject id cannot be empty"));
        }
        if claims.fallback_hash.is_empty() {
            return Err(self.reject_invalid(claims, "fallback hash cannot be empty"));
        }

        let resolved = self
            .resolver
            .resolve(claims.primary_hash.as_deref(), &claims.fallback_hash)
            .await?;

        if let Some((account, crosswalk)) = self.find_by_subject(&claims.subject_id).await? {
            return self.verify_existing(claims, &resolved, account, crosswalk).await;
        }

        self.create_account(claims, &resolved).await
    }

    async fn find_by_subject(
        &self,
        subject_id: &str,
    ) -> LinkResult<Option<(LocalAccount, Crosswalk)>> {
        let account = sqlx::query_as::<_, LocalAccount>(
            "SELECT id, subject_id, given_name, family_name, email, created_at
             FROM account WHERE subject_id = ?1",
        )
        .bind(subject_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(account) = account else {
            return Ok(None);
        };

        // Invariant: every account owns exactly one crosswalk.
        let crosswalk = sqlx::query_as::<_, Crosswalk>(
            "SELECT account_id, primary_hash, fallback_hash, external_record_id, provenance,
                    created_at, updated_at
             FROM crosswalk WHERE account_id = ?1",
        )
        .bind(&account.id)
        .fetch_one(&self.db)
        .await?;

        Ok(Some((account, crosswalk)))
    }

    /// Verify an existing linkage against the fresh resolution, backfilling
    /// where allowed. Mismatches are logged as consistency anomalies; only
    /// strict mode turns them into failures.
    async fn verify_existing(
        &self,
        claims: &SubjectClaims,
        resolved: &ResolutionOutcome,
        account: LocalAccount,
        mut crosswalk: Crosswalk,
    ) -> LinkResult<LocalAccount> {
        if crosswalk.fallback_hash != claims.fallback_hash {
            let anomaly = ConsistencyAnomaly {
                field: "fallback_hash",
                stored: crosswalk.fallback_hash.clone(),
                observed: claims.fallback_hash.clone(),
            };
            self.emit_anomaly(claims, resolved, anomaly.clone());
            if self.config.strict_fallback_match {
                return Err(LinkError::ConsistencyViolation {
                    field: anomaly.field,
                    stored: anomaly.stored,
                    observed: anomaly.observed,
                });
            }
        }

        if crosswalk.external_record_id != resolved.external_record_id {
            let anomaly = ConsistencyAnomaly {
                field: "external_record_id",
                stored: crosswalk.external_record_id.clone(),
                observed: resolved.external_record_id.clone(),
            };
            self.emit_anomaly(claims, resolved, anomaly.clone());
            if self.config.strict_fallback_match {
                return Err(LinkError::ConsistencyViolation {
                    field: anomaly.field,
                    stored: anomaly.stored,
                    observed: anomaly.observed,
                });
            }
        }

        let mut dirty = false;

        match (&crosswalk.primary_hash, &claims.primary_hash) {
            (Some(stored), Some(observed)) if stored != observed => {
                // Sticky once established: the divergence is logged, the
                // stored value stays.
                self.emit_anomaly(
                    claims,
                    resolved,
                    ConsistencyAnomaly {
                        field: "primary_hash",
                        stored: stored.clone(),
                        observed: observed.clone(),
                    },
                );
            }
            (None, Some(observed)) => {
                // First-seen upgrade path: accounts created before a primary
                // identifier existed get one attached when it appears.
                crosswalk.primary_hash = Some(observed.clone());
                dirty = true;
                self.emit(
                    RECONCILE_EVENT,
                    "updated",
                    claims,
                    Some(&resolved.external_record_id),
                    "backfilled primary hash previously unset",
                );
            }
            _ => {}
        }

        if crosswalk.provenance != resolved.provenance.code() {
            crosswalk.provenance = resolved.provenance.code().to_string();
            dirty = true;
            self.emit(
                RECONCILE_EVENT,
                "updated",
                claims,
                Some(&resolved.external_record_id),
                "resolution provenance changed since previous lookup",
            );
        }

        if dirty {
            sqlx::query(
                "UPDATE crosswalk SET primary_hash = ?1, provenance = ?2, updated_at = ?3
                 WHERE account_id = ?4",
            )
            .bind(&crosswalk.primary_hash)
            .bind(&crosswalk.provenance)
            .bind(Utc::now())
            .bind(&crosswalk.account_id)
            .execute(&self.db)
            .await
            .map_err(|e| self.map_unique_violation(e, claims))?;
        }

        self.emit(
            RECONCILE_EVENT,
            "existing",
            claims,
            Some(&resolved.external_record_id),
            "returning existing account",
        );
        Ok(account)
    }

    /// Create the account and crosswalk in one all-or-nothing transaction.
    async fn create_account(
        &self,
        claims: &SubjectClaims,
        resolved: &ResolutionOutcome,
    ) -> LinkResult<LocalAccount> {
        self.validate_new_record(claims, resolved)?;
        self.check_uniqueness(claims, resolved).await?;

        let account = LocalAccount {
            id: Uuid::new_v4().to_string(),
            subject_id: claims.subject_id.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            email: claims.email.clone(),
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO account (id, subject_id, given_name, family_name, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&account.id)
        .bind(&account.subject_id)
        .bind(&account.given_name)
        .bind(&account.family_name)
        .bind(&account.email)
        .bind(account.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| self.map_unique_violation(e, claims))?;

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO crosswalk (account_id, primary_hash, fallback_hash, external_record_id,
                                    provenance, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&account.id)
        .bind(&claims.primary_hash)
        .bind(&claims.fallback_hash)
        .bind(&resolved.external_record_id)
        .bind(resolved.provenance.code())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| self.map_unique_violation(e, claims))?;

        self.hook.on_account_created(&mut tx, &account).await?;

        tx.commit()
            .await
            .map_err(|e| self.map_unique_violation(e, claims))?;

        self.emit(
            CREATE_EVENT,
            "created",
            claims,
            Some(&resolved.external_record_id),
            "created account and crosswalk",
        );
        Ok(account)
    }

    fn validate_new_record(
        &self,
        claims: &SubjectClaims,
        resolved: &ResolutionOutcome,
    ) -> LinkResult<()> {
        if !hash::is_valid_hash(&claims.fallback_hash) {
            return Err(self.reject_invalid(claims, "incorrect fallback hash format"));
        }
        if let Some(primary) = &claims.primary_hash {
            if !hash::is_valid_hash(primary) {
                return Err(self.reject_invalid(claims, "incorrect primary hash format"));
            }
        }
        if resolved.external_record_id.is_empty() {
            return Err(self.reject_invalid(claims, "external record id cannot be empty"));
        }
        Ok(())
    }

    /// Existence pre-checks for each uniqueness axis. The store's unique
    /// constraints re-validate these at commit time; these checks exist to
    /// name the colliding field before any write is attempted.
    async fn check_uniqueness(
        &self,
        claims: &SubjectClaims,
        resolved: &ResolutionOutcome,
    ) -> LinkResult<()> {
        if self
            .exists("SELECT 1 FROM account WHERE subject_id = ?1", &claims.subject_id)
            .await?
        {
            return Err(self.reject_duplicate(claims, DuplicateField::SubjectId));
        }

        if self
            .exists(
                "SELECT 1 FROM crosswalk WHERE fallback_hash = ?1",
                &claims.fallback_hash,
            )
            .await?
        {
            return Err(self.reject_duplicate(claims, DuplicateField::FallbackHash));
        }

        if let Some(primary) = &claims.primary_hash {
            if self
                .exists("SELECT 1 FROM crosswalk WHERE primary_hash = ?1", primary)
                .await?
            {
                return Err(self.reject_duplicate(claims, DuplicateField::PrimaryHash));
            }
        }

        if self
            .exists(
                "SELECT 1 FROM crosswalk WHERE external_record_id = ?1",
                &resolved.external_record_id,
            )
            .await?
        {
            return Err(self.reject_duplicate(claims, DuplicateField::ExternalRecordId));
        }

        Ok(())
    }

    async fn exists(&self, sql: &str, value: &str) -> LinkResult<bool> {
        Ok(sqlx::query(sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?
            .is_some())
    }

    /// Map a commit-time unique-constraint violation to the colliding
    /// field. This is the losing path of a concurrent creation race, where
    /// the earlier existence checks passed.
    fn map_unique_violation(&self, err: sqlx::Error, claims: &SubjectClaims) -> LinkError {
        let field = match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let message = db_err.message();
                if message.contains("account.subject_id") {
                    Some(DuplicateField::SubjectId)
                } else if message.contains("crosswalk.fallback_hash") {
                    Some(DuplicateField::FallbackHash)
                } else if message.contains("crosswalk.primary_hash") {
                    Some(DuplicateField::PrimaryHash)
                } else if message.contains("crosswalk.external_record_id") {
                    Some(DuplicateField::ExternalRecordId)
                } else {
                    None
                }
            }
            _ => None,
        };

        match field {
            Some(field) => self.reject_duplicate(claims, field),
            None => LinkError::Database(err),
        }
    }

    fn reject_invalid(&self, claims: &SubjectClaims, reason: &str) -> LinkError {
        self.emit(CREATE_EVENT, "rejected", claims, None, reason);
        LinkError::InvalidIdentity(reason.to_string())
    }

    fn reject_duplicate(&self, claims: &SubjectClaims, field: DuplicateField) -> LinkError {
        self.emit(
            CREATE_EVENT,
            "rejected",
            claims,
            None,
            format!("{} already linked to another account", field),
        );
        LinkError::DuplicateRecord { field }
    }

    fn emit_anomaly(
        &self,
        claims: &SubjectClaims,
        resolved: &ResolutionOutcome,
        anomaly: ConsistencyAnomaly,
    ) {
        let event = AuditEvent::new(
            RECONCILE_EVENT,
            "anomaly",
            claims.primary_hash.as_deref(),
            &claims.fallback_hash,
            format!("stored {} no longer matches resolved identity", anomaly.field),
        )
        .with_subject(&claims.subject_id)
        .with_kind(resolved.provenance)
        .with_external_id(&resolved.external_record_id)
        .with_anomaly(anomaly);
        self.audit.emit(event);
    }

    fn emit(
        &self,
        event_type: &'static str,
        outcome: &'static str,
        claims: &SubjectClaims,
        external_record_id: Option<&str>,
        reason: impl Into<String>,
    ) {
        let mut event = AuditEvent::new(
            event_type,
            outcome,
            claims.primary_hash.as_deref(),
            &claims.fallback_hash,
            reason,
        )
        .with_subject(&claims.subject_id);
        if let Some(id) = external_record_id {
            event = event.with_external_id(id);
        }
        self.audit.emit(event);
    }
}
