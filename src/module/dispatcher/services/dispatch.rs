use super::super::submitter::{SubmitError, WorkloadSubmitter};
use crate::domain::{Notification, WorkloadTemplate};
use crate::library::communication::event::{Consumer, Disposition, NotificationFrame};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Raised when parsing an unknown [`SubmitFailurePolicy`]
#[derive(Debug, Error)]
#[error("unknown submit failure policy '{0}', expected 'acknowledge' or 'requeue'")]
pub struct UnknownPolicyError(String);

/// Settlement of notifications whose workload could not be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitFailurePolicy {
    /// Drop the notification
    Acknowledge,
    /// Ask the bus to deliver the notification again
    Requeue,
}

impl Default for SubmitFailurePolicy {
    fn default() -> Self {
        SubmitFailurePolicy::Acknowledge
    }
}

impl FromStr for SubmitFailurePolicy {
    type Err = UnknownPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acknowledge" | "ack" => Ok(SubmitFailurePolicy::Acknowledge),
            "requeue" | "nack" => Ok(SubmitFailurePolicy::Requeue),
            _ => Err(UnknownPolicyError(s.to_owned())),
        }
    }
}

/// Deliveries after which a notification is dropped unless configured otherwise
pub const DEFAULT_REDELIVERY_LIMIT: u32 = 5;

/// Rules translating a [`DispatchOutcome`] into a [`Disposition`]
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Settlement after a failed submission
    pub on_submit_failure: SubmitFailurePolicy,
    /// Deliveries after which a notification is acknowledged instead of requeued
    pub redelivery_limit: Option<u32>,
    /// Upper bound for a single submission
    pub submit_timeout: Option<Duration>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            on_submit_failure: SubmitFailurePolicy::default(),
            redelivery_limit: Some(DEFAULT_REDELIVERY_LIMIT),
            submit_timeout: None,
        }
    }
}

impl DispatchPolicy {
    /// Decides how a delivery with the given outcome is settled
    pub fn disposition(&self, outcome: DispatchOutcome, delivery_count: u32) -> Disposition {
        let disposition = match outcome {
            DispatchOutcome::DecodeFailed => Disposition::Requeue,
            DispatchOutcome::SubmitFailed => match self.on_submit_failure {
                SubmitFailurePolicy::Acknowledge => Disposition::Acknowledge,
                SubmitFailurePolicy::Requeue => Disposition::Requeue,
            },
            DispatchOutcome::Skipped
            | DispatchOutcome::Submitted
            | DispatchOutcome::Duplicate => Disposition::Acknowledge,
        };

        match (disposition, self.redelivery_limit) {
            (Disposition::Requeue, Some(limit)) if delivery_count >= limit => {
                error!(
                    ?outcome,
                    delivery_count, limit, "Redelivery limit reached, dropping notification"
                );
                Disposition::Acknowledge
            }
            _ => disposition,
        }
    }
}

/// Result of handling a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notification does not announce an object creation
    Skipped,
    /// Payload is not a notification
    DecodeFailed,
    /// Workload could not be created
    SubmitFailed,
    /// Workload has been created
    Submitted,
    /// Workload for this notification exists already
    Duplicate,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Service turning object creation notifications into workloads
pub struct DispatchService<S> {
    template: WorkloadTemplate,
    policy: DispatchPolicy,
    submitter: Arc<S>,
}

impl<S> DispatchService<S>
where
    S: WorkloadSubmitter + Send + Sync,
{
    /// Creates a new instance from raw parts
    pub fn new(template: WorkloadTemplate, policy: DispatchPolicy, submitter: Arc<S>) -> Self {
        Self {
            template,
            policy,
            submitter,
        }
    }

    /// Decodes, filters and submits a single raw notification
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn dispatch(&self, payload: &[u8]) -> DispatchOutcome {
        let notification = match Notification::decode(payload) {
            Ok(notification) => notification,
            Err(error) => {
                warn!(%error, "Unable to decode notification");
                return DispatchOutcome::DecodeFailed;
            }
        };

        if !notification.is_actionable() {
            debug!(event = %notification.kind(), key = notification.key(), "Ignoring notification");
            return DispatchOutcome::Skipped;
        }

        // Directory markers and keys at the storage root name no object to process
        let key = match notification.object_key() {
            Ok(key) => key,
            Err(error) => {
                warn!(%error, "Ignoring notification without object name");
                return DispatchOutcome::Skipped;
            }
        };

        let descriptor = self.template.build(&notification, &key);
        let workload = descriptor.name.clone();

        let result = match self.policy.submit_timeout {
            Some(limit) => match timeout(limit, self.submitter.submit(&descriptor)).await {
                Ok(result) => result,
                Err(_) => Err(SubmitError::Timeout(limit)),
            },
            None => self.submitter.submit(&descriptor).await,
        };

        match result {
            Ok(()) => {
                info!(%workload, bucket = key.bucket(), object = key.object(), "Workload submitted");
                DispatchOutcome::Submitted
            }
            Err(SubmitError::AlreadyExists(_)) => {
                info!(%workload, %key, "Workload exists already");
                DispatchOutcome::Duplicate
            }
            Err(error) => {
                error!(%workload, %key, %error, "Failed to submit workload");
                DispatchOutcome::SubmitFailed
            }
        }
    }
}

#[async_trait]
impl<S> Consumer for DispatchService<S>
where
    S: WorkloadSubmitter + Send + Sync,
{
    async fn consume(&self, frame: NotificationFrame<'_>) -> Disposition {
        let outcome = self.dispatch(frame.payload()).await;
        let disposition = self.policy.disposition(outcome, frame.delivery_count());

        debug!(%outcome, ?disposition, delivery_count = frame.delivery_count(), "Notification handled");

        disposition
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::domain::{NamingStrategy, WorkloadDescriptor};
    use crate::library::communication::event::{
        ConsumerExt, ConsumerGroupDescriptor, QueueDescriptor, Subscription,
    };
    use crate::library::communication::implementation::mock::{MockQueueProvider, Settlement};
    use lazy_static::lazy_static;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    const PUT: &[u8] = br#"{"EventName":"s3:ObjectCreated:Put","Key":"ftpserver/CCE29012021.pdf"}"#;
    const DELETE: &[u8] =
        br#"{"EventName":"s3:ObjectRemoved:Delete","Key":"ftpserver/CCE29012021.pdf"}"#;

    lazy_static! {
        static ref TEMPLATE: WorkloadTemplate = WorkloadTemplate {
            namespace: "ocr".into(),
            image: "mschneider82/s3ocr".into(),
            storage_endpoint: "minio.local:9000".into(),
            storage_access_key: "access".into(),
            storage_use_ssl: true,
            storage_secret: "minio/secretkey".parse().unwrap(),
            seafile_server: "https://seafile.local".into(),
            seafile_token_secret: "seafile/token".parse().unwrap(),
            seafile_library_id: "library".into(),
            ttl_after_finished: Duration::from_secs(300),
            naming: NamingStrategy::Random,
        };
    }

    /// Records submitted descriptors and answers with a fixed result after a delay
    struct MockSubmitter<F> {
        respond: F,
        delay: Duration,
        submitted: Mutex<Vec<WorkloadDescriptor>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl<F> MockSubmitter<F>
    where
        F: Fn() -> Result<(), SubmitError>,
    {
        fn new(respond: F) -> Arc<Self> {
            Self::delayed(Duration::ZERO, respond)
        }

        fn delayed(delay: Duration, respond: F) -> Arc<Self> {
            Arc::new(Self {
                respond,
                delay,
                submitted: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn submitted(&self) -> Vec<WorkloadDescriptor> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<F> WorkloadSubmitter for MockSubmitter<F>
    where
        F: Fn() -> Result<(), SubmitError> + Send + Sync,
    {
        async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<(), SubmitError> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            sleep(self.delay).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.submitted.lock().unwrap().push(descriptor.clone());

            (self.respond)()
        }
    }

    fn rejection() -> Result<(), SubmitError> {
        Err(SubmitError::Rejected {
            code: 403,
            reason: "Forbidden".into(),
            message: "jobs.batch is forbidden".into(),
        })
    }

    fn service<S>(submitter: Arc<S>, policy: DispatchPolicy) -> DispatchService<S>
    where
        S: WorkloadSubmitter + Send + Sync,
    {
        DispatchService::new(TEMPLATE.clone(), policy, submitter)
    }

    fn subscription(max_in_flight: usize) -> Subscription {
        Subscription {
            queue: QueueDescriptor::new("minio".into()),
            group: ConsumerGroupDescriptor::new("ocrsuper".into()),
            consumer: "test".into(),
            max_in_flight,
            drain_timeout: None,
            requeue_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn requeue_malformed_notifications() {
        let submitter = MockSubmitter::new(|| Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());
        let provider = MockQueueProvider::default();
        let id = provider.publish(&b"{\"EventName\":\"s3:ObjectCreated:Put\""[..]);

        let shutdown = provider.settled(1);
        service
            .consume_queue(&provider, &subscription(1), shutdown)
            .await
            .unwrap();

        assert_eq!(provider.settlements_of(id)[0], Settlement::Requeued);
        assert!(submitter.submitted().is_empty());
    }

    #[tokio::test]
    async fn skip_everything_but_object_creation() {
        let submitter = MockSubmitter::new(|| Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());

        assert_eq!(service.dispatch(DELETE).await, DispatchOutcome::Skipped);
        assert_eq!(
            service.consume(NotificationFrame::new(DELETE, 1)).await,
            Disposition::Acknowledge
        );
        assert!(submitter.submitted().is_empty());
    }

    #[tokio::test]
    async fn acknowledge_keys_without_object_name() {
        let submitter = MockSubmitter::new(|| Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());

        let directory = br#"{"EventName":"s3:ObjectCreated:Put","Key":"ftpserver/scans/"}"#;
        let root = br#"{"EventName":"s3:ObjectCreated:Put","Key":"report.pdf"}"#;

        for payload in [&directory[..], &root[..]] {
            assert_eq!(service.dispatch(payload).await, DispatchOutcome::Skipped);
            assert_eq!(
                service.consume(NotificationFrame::new(payload, 1)).await,
                Disposition::Acknowledge
            );
        }

        assert!(submitter.submitted().is_empty());
    }

    #[tokio::test]
    async fn skip_ignored_events_regardless_of_key_shape() {
        let submitter = MockSubmitter::new(|| Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());
        let removal = br#"{"EventName":"s3:ObjectRemoved:Delete","Key":"report.pdf"}"#;

        assert_eq!(
            service.consume(NotificationFrame::new(removal, 1)).await,
            Disposition::Acknowledge
        );
        assert!(submitter.submitted().is_empty());
    }

    #[test]
    fn bound_redeliveries_by_default() {
        let policy = DispatchPolicy::default();

        assert_eq!(
            policy.disposition(DispatchOutcome::DecodeFailed, DEFAULT_REDELIVERY_LIMIT - 1),
            Disposition::Requeue
        );
        assert_eq!(
            policy.disposition(DispatchOutcome::DecodeFailed, DEFAULT_REDELIVERY_LIMIT),
            Disposition::Acknowledge
        );
    }

    #[tokio::test]
    async fn submit_object_creations() {
        let submitter = MockSubmitter::new(|| Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());

        assert_eq!(
            service.consume(NotificationFrame::new(PUT, 1)).await,
            Disposition::Acknowledge
        );

        let submitted = submitter.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].args.contains(&"--bucket=ftpserver".to_owned()));
        assert!(submitted[0].args.contains(&"--object=CCE29012021.pdf".to_owned()));
    }

    #[tokio::test]
    async fn acknowledge_submit_failures() {
        let submitter = MockSubmitter::new(rejection);
        let service = service(submitter.clone(), DispatchPolicy::default());
        let provider = MockQueueProvider::default();
        let id = provider.publish(PUT);

        let shutdown = provider.settled(1);
        service
            .consume_queue(&provider, &subscription(1), shutdown)
            .await
            .unwrap();

        assert_eq!(provider.settlements_of(id), vec![Settlement::Acknowledged]);
        assert_eq!(submitter.submitted().len(), 1);
    }

    #[tokio::test]
    async fn requeue_submit_failures_when_configured() {
        let policy = DispatchPolicy {
            on_submit_failure: SubmitFailurePolicy::Requeue,
            ..Default::default()
        };
        let service = service(MockSubmitter::new(rejection), policy);

        assert_eq!(
            service.consume(NotificationFrame::new(PUT, 1)).await,
            Disposition::Requeue
        );
    }

    #[tokio::test]
    async fn drop_notifications_exceeding_the_redelivery_limit() {
        let policy = DispatchPolicy {
            on_submit_failure: SubmitFailurePolicy::Requeue,
            redelivery_limit: Some(3),
            ..Default::default()
        };
        let submitter = MockSubmitter::new(rejection);
        let service = service(submitter.clone(), policy);
        let provider = MockQueueProvider::default();
        let id = provider.publish(PUT);

        let shutdown = provider.settled(3);
        service
            .consume_queue(&provider, &subscription(1), shutdown)
            .await
            .unwrap();

        assert_eq!(provider.delivery_counts_of(id), vec![1, 2, 3]);
        assert_eq!(
            provider.settlements_of(id),
            vec![
                Settlement::Requeued,
                Settlement::Requeued,
                Settlement::Acknowledged
            ]
        );
        assert_eq!(submitter.submitted().len(), 3);
    }

    #[test]
    fn apply_redelivery_limit_to_malformed_notifications() {
        let policy = DispatchPolicy {
            redelivery_limit: Some(5),
            ..Default::default()
        };

        assert_eq!(
            policy.disposition(DispatchOutcome::DecodeFailed, 4),
            Disposition::Requeue
        );
        assert_eq!(
            policy.disposition(DispatchOutcome::DecodeFailed, 5),
            Disposition::Acknowledge
        );
    }

    #[tokio::test]
    async fn acknowledge_duplicates() {
        let submitter = MockSubmitter::new(|| Err(SubmitError::AlreadyExists("ocrfile-x".into())));
        let policy = DispatchPolicy {
            on_submit_failure: SubmitFailurePolicy::Requeue,
            ..Default::default()
        };
        let service = service(submitter, policy);

        assert_eq!(service.dispatch(PUT).await, DispatchOutcome::Duplicate);
        assert_eq!(
            service.consume(NotificationFrame::new(PUT, 1)).await,
            Disposition::Acknowledge
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fail_submissions_exceeding_the_timeout() {
        let submitter = MockSubmitter::delayed(Duration::from_secs(60), || Ok(()));
        let policy = DispatchPolicy {
            submit_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let service = service(submitter, policy);

        assert_eq!(service.dispatch(PUT).await, DispatchOutcome::SubmitFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_concurrent_submissions() {
        let submitter = MockSubmitter::delayed(Duration::from_millis(50), || Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());
        let provider = MockQueueProvider::default();
        for _ in 0..12 {
            provider.publish(PUT);
        }

        let shutdown = provider.settled(12);
        service
            .consume_queue(&provider, &subscription(4), shutdown)
            .await
            .unwrap();

        assert_eq!(submitter.submitted().len(), 12);
        assert_eq!(submitter.peak.load(Ordering::SeqCst), 4);
        assert!(provider
            .settlements()
            .iter()
            .all(|s| *s == Settlement::Acknowledged));
    }

    #[tokio::test]
    async fn create_independent_workloads_for_redeliveries() {
        let submitter = MockSubmitter::new(|| Ok(()));
        let service = service(submitter.clone(), DispatchPolicy::default());

        service.consume(NotificationFrame::new(PUT, 1)).await;
        service.consume(NotificationFrame::new(PUT, 2)).await;

        let submitted = submitter.submitted();
        assert_eq!(submitted.len(), 2);
        assert_ne!(submitted[0].name, submitted[1].name);
        assert_eq!(submitted[0].args, submitted[1].args);
    }
}
