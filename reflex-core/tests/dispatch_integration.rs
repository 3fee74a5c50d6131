//! Integration tests for batch dispatch.
//!
//! These drive whole events through the dispatcher against the recording
//! `MockGateway`, checking the order and content of remote calls.

use pretty_assertions::assert_eq;
use reflex_core::gateway::{DescribeInstancesOutput, GatewayCall};
use reflex_core::registry::{C2_ACTIVITY, C2_DNS_ACTIVITY};
use reflex_core::{
    ConfigResolver, ContainmentConfig, DispatchResponse, DispatchSummary, Dispatcher,
    FindingBatch, HandlerRegistry, LockReleasePolicy, MockGateway, ParameterCache, ResourceTag,
    StaticParameterSource, WorkflowContext,
};
use serde_json::{Value, json};
use std::sync::Arc;

const QUARANTINE_PARAM: &str = "/reflex/quarantine-security-group-id";
const CHANNEL_PARAM: &str = "/reflex/forensics-topic-arn";

fn raw_finding(finding_type: &str, id: &str, instance_id: &str) -> Value {
    json!({
        "Type": finding_type,
        "Id": id,
        "Resource": {"InstanceDetails": {"InstanceId": instance_id}},
        "Service": {
            "Action": {
                "NetworkConnectionAction": {
                    "RemoteIpDetails": {"IpAddressV4": "198.51.100.10"}
                }
            }
        }
    })
}

fn event(findings: Vec<Value>) -> Value {
    json!({
        "version": "0",
        "detail-type": "GuardDuty Finding",
        "detail": {"service": {"additionalInfo": {"findings": findings}}}
    })
}

fn full_parameters() -> Arc<StaticParameterSource> {
    Arc::new(
        StaticParameterSource::default()
            .with(QUARANTINE_PARAM, "quarantine-group")
            .with(CHANNEL_PARAM, "arn:aws:sns:us-east-1:111122223333:ForensicsTeamTopic"),
    )
}

fn dispatcher(
    gateway: Arc<MockGateway>,
    parameters: Arc<StaticParameterSource>,
    policy: LockReleasePolicy,
) -> Dispatcher {
    let containment = ContainmentConfig {
        lock_release: policy,
        ..ContainmentConfig::default()
    };
    let resolver = ConfigResolver::new(parameters, Arc::new(ParameterCache::new()));
    Dispatcher::new(
        HandlerRegistry::with_defaults(),
        WorkflowContext::new(gateway, resolver, containment),
    )
}

async fn run(dispatcher: &Dispatcher, findings: Vec<Value>) -> (DispatchResponse, DispatchSummary) {
    let batch = FindingBatch::from_event(&event(findings)).unwrap();
    dispatcher.dispatch_with_summary(&batch).await
}

#[tokio::test]
async fn c2_finding_runs_full_containment_in_order() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_volume("i-1", "vol-1")
            .with_snapshot_id("snap-55555"),
    );
    let dispatcher = dispatcher(gateway.clone(), full_parameters(), LockReleasePolicy::Retain);

    let (response, summary) = run(&dispatcher, vec![raw_finding(C2_ACTIVITY, "F1", "i-1")]).await;

    assert_eq!(response, DispatchResponse::complete());
    assert_eq!(summary.completed, 1);

    let calls = gateway.calls().await;
    assert_eq!(
        calls[..5].to_vec(),
        vec![
            GatewayCall::DescribeTags {
                resource_id: "i-1".into(),
                key: "reflex:remediation-in-progress".into(),
            },
            GatewayCall::CreateTags {
                resource_id: "i-1".into(),
                tags: vec![ResourceTag::new("reflex:remediation-in-progress", "true")],
            },
            GatewayCall::ModifyNetworkMembership {
                resource_id: "i-1".into(),
                groups: vec!["quarantine-group".into()],
            },
            GatewayCall::DescribeResource {
                resource_id: "i-1".into(),
            },
            GatewayCall::CreateSnapshot {
                volume_id: "vol-1".into(),
                description: "Forensic snapshot for instance i-1 from GuardDuty finding F1".into(),
            },
        ]
    );
    assert_eq!(
        calls[5],
        GatewayCall::TerminateResource {
            resource_id: "i-1".into()
        }
    );
    match &calls[6] {
        GatewayCall::PublishMessage {
            channel,
            subject,
            body,
        } => {
            assert_eq!(
                channel,
                "arn:aws:sns:us-east-1:111122223333:ForensicsTeamTopic"
            );
            assert_eq!(subject, "Automated C2 Response for Instance i-1");
            assert!(body.contains("Finding Type: Backdoor:EC2/C&CActivity.B"));
            assert!(body.contains("2. Forensic snapshot created: snap-55555"));
        }
        other => panic!("expected publish-message, got {other:?}"),
    }
    assert_eq!(calls.len(), 7);
}

#[tokio::test]
async fn missing_block_device_mapping_halts_for_manual_intervention() {
    let gateway = Arc::new(
        MockGateway::new().with_description(
            serde_json::from_value::<DescribeInstancesOutput>(json!({
                "Reservations": [{"Instances": [{"InstanceId": "i-1", "BlockDeviceMappings": []}]}]
            }))
            .unwrap(),
        ),
    );
    let dispatcher = dispatcher(gateway.clone(), full_parameters(), LockReleasePolicy::Retain);

    let (response, summary) = run(&dispatcher, vec![raw_finding(C2_ACTIVITY, "F1", "i-1")]).await;

    assert_eq!(response.status_code, 200);
    assert_eq!(summary.manual_intervention, 1);
    assert_eq!(gateway.count("terminate-resource").await, 0);
    assert_eq!(gateway.count("publish-message").await, 0);
    assert_eq!(gateway.count("modify-network-membership").await, 1);
}

#[tokio::test]
async fn mixed_batch_is_processed_to_the_end() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_volume("i-3", "vol-3")
            .with_tag("i-2", ResourceTag::new("reflex:remediation-in-progress", "true")),
    );
    let dispatcher = dispatcher(gateway.clone(), full_parameters(), LockReleasePolicy::Retain);

    let malformed = json!({
        "Type": C2_ACTIVITY,
        "Id": "F-bad",
        "Resource": {"InstanceDetails": {}}
    });
    let findings = vec![
        raw_finding("Recon:EC2/PortProbeUnprotectedPort", "F0", "i-0"),
        malformed,
        json!({"Id": "no-type"}),
        raw_finding(C2_ACTIVITY, "F2", "i-2"),
        raw_finding(C2_DNS_ACTIVITY, "F3", "i-3"),
    ];

    let (response, summary) = run(&dispatcher, findings).await;

    assert_eq!(response, DispatchResponse::complete());
    assert_eq!(
        summary,
        DispatchSummary {
            received: 5,
            parse_failures: 2,
            unhandled: 1,
            construction_failures: 0,
            completed: 1,
            skipped_lock_held: 1,
            skipped_lock_check_failed: 0,
            manual_intervention: 0,
            failed: 0,
        }
    );

    // Only the DNS finding on i-3 reached the destructive steps.
    let terminated: Vec<GatewayCall> = gateway
        .calls()
        .await
        .into_iter()
        .filter(|c| c.operation() == "terminate-resource")
        .collect();
    assert_eq!(
        terminated,
        vec![GatewayCall::TerminateResource {
            resource_id: "i-3".into()
        }]
    );
}

#[tokio::test]
async fn gateway_failure_does_not_stop_sibling_findings() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_volume("i-1", "vol-1")
            .failing("publish-message"),
    );
    let dispatcher = dispatcher(
        gateway.clone(),
        full_parameters(),
        LockReleasePolicy::ClearOnFailure,
    );

    let (response, summary) = run(
        &dispatcher,
        vec![
            raw_finding(C2_ACTIVITY, "F1", "i-1"),
            raw_finding(C2_ACTIVITY, "F2", "i-2"),
        ],
    )
    .await;

    assert_eq!(response, DispatchResponse::complete());
    assert_eq!(summary.failed, 2);
    assert_eq!(gateway.count("terminate-resource").await, 2);
    assert_eq!(gateway.count("delete-tags").await, 2);
    assert!(gateway.tags_of("i-1").await.is_empty());
}

#[tokio::test]
async fn lock_check_failure_is_counted_separately() {
    let gateway = Arc::new(MockGateway::new().failing("describe-tags"));
    let dispatcher = dispatcher(gateway.clone(), full_parameters(), LockReleasePolicy::Retain);

    let (_, summary) = run(&dispatcher, vec![raw_finding(C2_ACTIVITY, "F1", "i-1")]).await;

    assert_eq!(summary.skipped_lock_check_failed, 1);
    assert_eq!(summary.skipped_lock_held, 0);
    assert_eq!(gateway.operations().await, vec!["describe-tags"]);
}

#[tokio::test]
async fn missing_parameter_fails_construction_without_side_effects() {
    let gateway = Arc::new(MockGateway::new().with_volume("i-1", "vol-1"));
    let parameters = Arc::new(StaticParameterSource::default().with(QUARANTINE_PARAM, "sg-q"));
    let dispatcher = dispatcher(gateway.clone(), parameters, LockReleasePolicy::Retain);

    let (response, summary) = run(
        &dispatcher,
        vec![
            raw_finding(C2_ACTIVITY, "F1", "i-1"),
            raw_finding(C2_DNS_ACTIVITY, "F2", "i-1"),
        ],
    )
    .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(summary.construction_failures, 2);
    assert!(gateway.calls().await.is_empty());
}

#[tokio::test]
async fn parameters_are_fetched_once_per_process() {
    let gateway = Arc::new(MockGateway::new().with_volume("i-1", "vol-1"));
    let parameters = full_parameters();
    let dispatcher = dispatcher(gateway.clone(), parameters.clone(), LockReleasePolicy::Retain);

    run(
        &dispatcher,
        vec![
            raw_finding(C2_ACTIVITY, "F1", "i-1"),
            raw_finding(C2_DNS_ACTIVITY, "F2", "i-2"),
        ],
    )
    .await;
    run(&dispatcher, vec![raw_finding(C2_ACTIVITY, "F3", "i-3")]).await;

    // Two parameters, each fetched exactly once across both batches.
    assert_eq!(parameters.fetch_count(), 2);
}

#[tokio::test]
async fn duplicate_finding_in_one_batch_is_deduplicated_by_lock() {
    let gateway = Arc::new(MockGateway::new().with_volume("i-1", "vol-1"));
    let dispatcher = dispatcher(gateway.clone(), full_parameters(), LockReleasePolicy::Retain);

    let (_, summary) = run(
        &dispatcher,
        vec![
            raw_finding(C2_ACTIVITY, "F1", "i-1"),
            raw_finding(C2_DNS_ACTIVITY, "F1-dns", "i-1"),
        ],
    )
    .await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped_lock_held, 1);
    assert_eq!(gateway.count("terminate-resource").await, 1);
    assert_eq!(gateway.count("publish-message").await, 1);
}

#[tokio::test]
async fn event_without_findings_is_rejected_before_dispatch() {
    let err = FindingBatch::from_event(&json!({"detail": {"service": {}}})).unwrap_err();
    assert!(err.to_string().contains("additionalInfo/findings"));
}
