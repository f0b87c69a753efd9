//! One check of one tracked file: observe, classify, log, remediate, alert.
//!
//! A check always runs to completion and appends exactly one log entry.

use crate::alert::{self, Notifier, SendmailNotifier};
use crate::classifier::{self, Observed, Verdict};
use crate::hasher::{ContentHasher, Hasher};
use crate::models::{MismatchKind, TrackedFile};
use crate::privilege::{PrivilegeOps, SystemPrivileges};
use crate::probe::{MetadataProber, SystemProber};
use crate::remediation::{CheckOutcome, RemediationEngine};
use crate::settings::SentinelSettings;
use crate::store::BaselineStore;
use crate::{Result, SentinelError};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct Checker {
    store: BaselineStore,
    hasher: Box<dyn ContentHasher + Send>,
    prober: Box<dyn MetadataProber + Send>,
    privileges: Box<dyn PrivilegeOps + Send>,
    notifier: Box<dyn Notifier + Send>,
    recipient: String,
}

impl Checker {
    /// Checker over `store` using the system collaborators. The digest
    /// algorithm is the one the store was generated with.
    pub fn new(store: BaselineStore, settings: &SentinelSettings) -> Result<Self> {
        let algorithm = store.hash_algorithm()?;
        Ok(Self {
            store,
            hasher: Box::new(Hasher::new(algorithm)),
            prober: Box::new(SystemProber),
            privileges: Box::new(SystemPrivileges),
            notifier: Box::new(SendmailNotifier::new(&settings.alert)),
            recipient: settings.alert.recipient.clone(),
        })
    }

    pub fn with_prober(mut self, prober: impl MetadataProber + Send + 'static) -> Self {
        self.prober = Box::new(prober);
        self
    }

    pub fn with_privileges(mut self, privileges: impl PrivilegeOps + Send + 'static) -> Self {
        self.privileges = Box::new(privileges);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + Send + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_hasher(mut self, hasher: impl ContentHasher + Send + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    pub fn hasher(&self) -> &dyn ContentHasher {
        self.hasher.as_ref()
    }

    pub fn prober(&self) -> &dyn MetadataProber {
        self.prober.as_ref()
    }

    /// Check every non-degraded file once, in enrollment order.
    pub fn check_all(&self) -> Result<Vec<(String, CheckOutcome)>> {
        let files = self.store.list_active()?;
        let mut results = Vec::with_capacity(files.len());
        for tracked in files {
            let outcome = self.check(&tracked)?;
            results.push((tracked.path, outcome));
        }
        Ok(results)
    }

    /// Check the tracked file at `path`. `None` when the path is not tracked
    /// or the file is degraded.
    pub fn check_path(&self, path: &str) -> Result<Option<CheckOutcome>> {
        match self.store.get_by_path(path)? {
            Some(tracked) if !tracked.degraded => self.check(&tracked).map(Some),
            _ => Ok(None),
        }
    }

    pub fn check(&self, tracked: &TrackedFile) -> Result<CheckOutcome> {
        let path = Path::new(&tracked.path);
        let (observed, content) = match self.observe(tracked, path) {
            Ok(sample) => sample,
            Err(SentinelError::Unreadable { source, .. }) => {
                warn!(path = %tracked.path, error = %source, "tracked file unreadable; degrading");
                self.store.append_log(tracked.id, MismatchKind::Unreadable)?;
                self.store.mark_degraded(tracked.id)?;
                let outcome = CheckOutcome::Degraded;
                if tracked.policy.auto_email {
                    self.alert(tracked, alert::UNREADABLE_SUBJECT, &outcome);
                }
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let verdict = classifier::classify(tracked, &observed);
        let log_id = self.store.append_log(tracked.id, verdict.kind())?;
        self.record_forensics(log_id, &verdict, content.as_deref())?;

        let engine = RemediationEngine {
            store: &self.store,
            hasher: self.hasher.as_ref(),
            prober: self.prober.as_ref(),
            privileges: self.privileges.as_ref(),
        };
        let outcome = engine.apply(tracked, &verdict)?;

        match &verdict {
            Verdict::Clean => debug!(path = %tracked.path, "clean"),
            other => info!(
                path = %tracked.path,
                verdict = %other.kind(),
                outcome = outcome.label(),
                "divergence handled"
            ),
        }

        if tracked.policy.auto_email {
            if let Some(subject) = alert::subject_for(&verdict) {
                self.alert(tracked, subject, &outcome);
            }
        }
        Ok(outcome)
    }

    /// Observe the file at `path`. When the streamed digest diverges from the
    /// baseline, the content is read once more into memory and the digest is
    /// taken over that buffer, which is returned for the forensic record.
    fn observe(&self, tracked: &TrackedFile, path: &Path) -> Result<(Observed, Option<Vec<u8>>)> {
        if !self.prober.resolves_to_regular_file(path) {
            return Ok((Observed::Missing, None));
        }
        let mut digest = self.hasher.hash_file(path)?;
        let mut content = None;
        if digest != tracked.good_digest {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Observed::Missing, None)),
                Err(e) => return Err(SentinelError::unreadable(path, e)),
            };
            digest = self.hasher.hash_bytes(&bytes);
            content = Some(bytes);
        }
        match self.prober.probe(path) {
            Ok(observation) => Ok((
                Observed::Present {
                    digest,
                    observation,
                },
                content,
            )),
            // Removed between hashing and probing
            Err(SentinelError::NotFound(_)) => Ok((Observed::Missing, None)),
            Err(e) => Err(e),
        }
    }

    fn record_forensics(&self, log_id: i64, verdict: &Verdict, content: Option<&[u8]>) -> Result<()> {
        match (verdict, content) {
            (Verdict::Checksum { observed_digest }, Some(content)) => self
                .store
                .append_forensic_checksum(log_id, observed_digest, content),
            (Verdict::Metadata { observed, .. }, _) => self.store.append_forensic_metadata(
                log_id,
                observed.owner,
                observed.group,
                observed.permission,
            ),
            _ => Ok(()),
        }
    }

    fn alert(&self, tracked: &TrackedFile, subject: &str, outcome: &CheckOutcome) {
        let body = format!("{}\n\nOutcome: {}", tracked.path, outcome.label());
        if let Err(e) = self.notifier.send(&self.recipient, subject, &body) {
            warn!(path = %tracked.path, error = %e, "alert delivery failed");
        }
    }
}
