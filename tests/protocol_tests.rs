use photo_manifest::pool::protocol::{
    self, BatchResult, BatchTask, CoordinatorMessage, TaskAssignment, TaskReply, WorkerHello,
    WorkerMessage, make_task_id, parse_task_index,
};
use photo_manifest::pool::workers_to_start;
use photo_manifest::services::Outcome;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn batch_task_round_trips_over_the_wire() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    let message = CoordinatorMessage::BatchTask(BatchTask {
        tasks: vec![
            TaskAssignment {
                task_id: make_task_id(2, 17, 1),
                task_index: 17,
            },
            TaskAssignment {
                task_id: make_task_id(2, 18, 2),
                task_index: 18,
            },
        ],
        worker_id: 2,
    });
    protocol::write_coordinator_message(&mut client, &message)
        .await
        .expect("write failed");

    let received = protocol::read_coordinator_message(&mut server)
        .await
        .expect("read failed")
        .expect("unexpected end of stream");

    match received {
        CoordinatorMessage::BatchTask(batch) => {
            assert_eq!(batch.worker_id, 2);
            assert_eq!(batch.tasks.len(), 2);
            assert_eq!(batch.tasks[0].task_index, 17);
            assert_eq!(parse_task_index(&batch.tasks[1].task_id), Some(18));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn worker_messages_round_trip_over_the_wire() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    protocol::write_worker_message(&mut client, &WorkerMessage::Ready(WorkerHello { worker_id: 3 }))
        .await
        .expect("write failed");
    protocol::write_worker_message(
        &mut client,
        &WorkerMessage::BatchResult(BatchResult {
            results: vec![TaskReply {
                task_id: make_task_id(3, 5, 9),
                outcome: Outcome::Failed,
                record: None,
                error: Some("boom".to_string()),
            }],
        }),
    )
    .await
    .expect("write failed");

    match protocol::read_worker_message(&mut server).await.unwrap() {
        Some(WorkerMessage::Ready(hello)) => assert_eq!(hello.worker_id, 3),
        other => panic!("unexpected message {:?}", other),
    }
    match protocol::read_worker_message(&mut server).await.unwrap() {
        Some(WorkerMessage::BatchResult(batch)) => {
            assert_eq!(batch.results.len(), 1);
            assert_eq!(batch.results[0].outcome, Outcome::Failed);
            assert_eq!(parse_task_index(&batch.results[0].task_id), Some(5));
            assert_eq!(batch.results[0].error.as_deref(), Some("boom"));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn end_of_stream_reads_as_none() {
    let (client, mut server) = tokio::io::duplex(1024);
    drop(client);
    let message = protocol::read_worker_message(&mut server)
        .await
        .expect("clean EOF should not error");
    assert!(message.is_none());
}

#[tokio::test]
async fn unsupported_protocol_versions_are_rejected() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    // length 2, bogus version 9, kind 1
    client
        .write_all(&[2, 0, 0, 0, 9, 1])
        .await
        .expect("write failed");

    assert!(protocol::read_worker_message(&mut server).await.is_err());
}

#[tokio::test]
async fn oversized_frames_are_rejected() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    client
        .write_all(&u32::MAX.to_le_bytes())
        .await
        .expect("write failed");

    assert!(protocol::read_worker_message(&mut server).await.is_err());
}

#[test]
fn task_ids_carry_their_index() {
    let task_id = make_task_id(4, 123, 77);
    assert_eq!(parse_task_index(&task_id), Some(123));
    assert!(parse_task_index("garbage").is_none());
    assert!(parse_task_index("1-x-2-3").is_none());
}

#[test]
fn worker_sizing_never_exceeds_the_task_count() {
    assert_eq!(workers_to_start(10, 100, 5), 10);
    assert_eq!(workers_to_start(10, 12, 5), 3);
    assert_eq!(workers_to_start(10, 1, 5), 1);
    assert_eq!(workers_to_start(2, 1000, 5), 2);
    assert_eq!(workers_to_start(10, 0, 5), 0);
    assert_eq!(workers_to_start(0, 50, 5), 1);
}
