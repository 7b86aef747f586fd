use async_trait::async_trait;
use pretty_assertions::assert_eq;
use s3ocr_dispatcher::domain::workload::RestartPolicy;
use s3ocr_dispatcher::domain::{NamingStrategy, WorkloadDescriptor, WorkloadTemplate};
use s3ocr_dispatcher::library::communication::event::{
    ConsumerExt, ConsumerGroupDescriptor, QueueDescriptor, Subscription,
};
use s3ocr_dispatcher::library::communication::implementation::mock::{
    MockQueueProvider, Settlement,
};
use s3ocr_dispatcher::module::dispatcher::{
    DispatchPolicy, DispatchService, SubmitError, WorkloadSubmitter,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSubmitter {
    calls: Mutex<Vec<WorkloadDescriptor>>,
}

#[async_trait]
impl WorkloadSubmitter for RecordingSubmitter {
    async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<(), SubmitError> {
        self.calls.lock().unwrap().push(descriptor.clone());
        Ok(())
    }
}

fn template() -> WorkloadTemplate {
    WorkloadTemplate {
        namespace: "ocr".into(),
        image: "mschneider82/s3ocr".into(),
        storage_endpoint: "minio.local:9000".into(),
        storage_access_key: "access".into(),
        storage_use_ssl: true,
        storage_secret: "minio/secretkey".parse().unwrap(),
        seafile_server: "https://seafile.local".into(),
        seafile_token_secret: "seafile/token".parse().unwrap(),
        seafile_library_id: "3e040126-4533-4d0c-97f3-baa284915515".into(),
        ttl_after_finished: Duration::from_secs(300),
        naming: NamingStrategy::Random,
    }
}

fn subscription() -> Subscription {
    Subscription {
        queue: QueueDescriptor::new("minio".into()),
        group: ConsumerGroupDescriptor::new("ocrsuper".into()),
        consumer: "dispatcher-0".into(),
        max_in_flight: 200,
        drain_timeout: None,
        requeue_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn dispatch_uploaded_object_to_kubernetes() {
    let submitter = Arc::new(RecordingSubmitter::default());
    let service = DispatchService::new(template(), DispatchPolicy::default(), submitter.clone());

    let provider = MockQueueProvider::default();
    let id = provider.publish(
        r#"{"EventName":"s3:ObjectCreated:Put","Key":"ftpserver/report.pdf","Records":[{"eventName":"s3:ObjectCreated:Put","s3":{"bucket":{"name":"ftpserver"},"object":{"key":"report.pdf","size":1024}}}]}"#,
    );

    let shutdown = provider.settled(1);
    service
        .consume_queue(&provider, &subscription(), shutdown)
        .await
        .unwrap();

    let calls = submitter.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);

    let descriptor = &calls[0];
    assert_eq!(descriptor.namespace, "ocr");
    assert_eq!(descriptor.restart_policy, RestartPolicy::Never);
    assert!(descriptor.args.contains(&"--bucket=ftpserver".to_owned()));
    assert!(descriptor.args.contains(&"--object=report.pdf".to_owned()));

    assert_eq!(provider.settlements_of(id), vec![Settlement::Acknowledged]);
}

#[tokio::test]
async fn settle_a_mixed_batch_of_notifications() {
    let submitter = Arc::new(RecordingSubmitter::default());
    let service = DispatchService::new(template(), DispatchPolicy::default(), submitter.clone());

    let provider = MockQueueProvider::default();
    let created = provider.publish(r#"{"EventName":"s3:ObjectCreated:Put","Key":"ftpserver/a.pdf"}"#);
    let removed =
        provider.publish(r#"{"EventName":"s3:ObjectRemoved:Delete","Key":"ftpserver/b.pdf"}"#);
    let garbage = provider.publish("garbage");

    // Malformed notifications keep coming back, so wait for the valid ones explicitly
    let shutdown = async {
        let mut count = 3;
        loop {
            provider.settled(count).await;

            if !provider.settlements_of(created).is_empty()
                && !provider.settlements_of(removed).is_empty()
            {
                break;
            }

            count += 1;
        }
    };

    service
        .consume_queue(&provider, &subscription(), shutdown)
        .await
        .unwrap();

    assert_eq!(submitter.calls.lock().unwrap().len(), 1);
    assert_eq!(provider.settlements_of(created), vec![Settlement::Acknowledged]);
    assert_eq!(provider.settlements_of(removed), vec![Settlement::Acknowledged]);
    assert_eq!(provider.settlements_of(garbage)[0], Settlement::Requeued);
}
