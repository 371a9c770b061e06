//! Recovery behaviour: catching up lagging nodes, defending committed
//! views, reply throttling.

mod common;

use common::*;
use dbft_payloads::{ChangeViewReason, ConsensusPayload, Message, MessageType};

/// Drive nodes 0, 1, 2 to view 1 with a proposal accepted and all three
/// committed, their Commit broadcasts withheld. Returns the withheld
/// commits.
fn committed_cluster_at_view_one(cluster: &mut Cluster) -> Vec<ConsensusPayload> {
    for i in [0usize, 1, 2] {
        cluster.nodes[i].start();
    }

    // The primary's proposal is lost; everyone times out into view 1. The
    // primary itself asks for the view change on its second timeout.
    cluster.fire(1);
    cluster.drop_outbox(1);
    for i in [0usize, 1, 2] {
        cluster.fire(i);
    }
    cluster.run_to_quiescence(&[0, 1, 2]);
    for i in [0usize, 1, 2] {
        assert_eq!(cluster.nodes[i].context().view_number, 1, "node {i}");
    }

    // View-1 primary (node 0) proposes; responses circulate, commits are
    // withheld by the network.
    cluster.fire(0);
    let proposal = cluster.take_outbox(0);
    for payload in &proposal {
        cluster.deliver(1, payload.clone());
        cluster.deliver(2, payload.clone());
    }
    let mut responses = Vec::new();
    for i in [1usize, 2] {
        responses.extend(cluster.take_outbox(i));
    }
    for payload in &responses {
        for to in [0usize, 1, 2] {
            if payload.validator_index as usize != to {
                cluster.deliver(to, payload.clone());
            }
        }
    }

    let mut commits = Vec::new();
    for i in [0usize, 1, 2] {
        assert!(cluster.nodes[i].context().commit_sent(), "node {i}");
        assert!(cluster.nodes[i].host().processed.is_empty(), "node {i}");
        commits.extend(cluster.take_outbox(i));
    }
    commits
}

/// A node that restarts mid-height is brought to the current view by a
/// single RecoveryMessage and finalizes the same block as everyone else.
#[test]
fn restarted_node_catches_up_via_recovery() {
    let tx_a = tx(b"recovered block");
    let mut cluster = Cluster::with_transactions(4, &[tx_a]);
    let withheld_commits = committed_cluster_at_view_one(&mut cluster);

    // Node 3 comes up fresh and asks for help.
    cluster.nodes[3].start();
    cluster.nodes[3].request_recovery();
    let recovery_request = cluster.take_outbox(3);
    assert_eq!(recovery_request.len(), 1);
    for to in [0usize, 1, 2] {
        cluster.deliver(to, recovery_request[0].clone());
    }

    // Committed nodes always answer.
    let reply_0 = cluster.take_outbox(0);
    let reply_1 = cluster.take_outbox(1);
    assert_eq!(reply_0.len(), 1);
    assert_eq!(reply_0[0].message_type(), MessageType::RecoveryMessage);
    assert_eq!(reply_1.len(), 1);

    // One bundle is enough to reach the current view and commit there.
    cluster.deliver(3, reply_0[0].clone());
    assert_eq!(cluster.nodes[3].context().view_number, 1);
    assert!(cluster.nodes[3].context().commit_sent());

    // The second bundle carries a second commit; together with node 3's
    // own that is still one short, then the withheld commits finish it.
    cluster.deliver(3, reply_1[0].clone());
    assert_eq!(cluster.nodes[3].host().processed.len(), 1);

    // Release everything else so the whole cluster finalizes.
    let node3_traffic = cluster.take_outbox(3);
    for payload in node3_traffic {
        for to in [0usize, 1, 2] {
            cluster.deliver(to, payload.clone());
        }
    }
    for payload in &withheld_commits {
        for to in [0usize, 1, 2] {
            if payload.validator_index as usize != to {
                cluster.deliver(to, payload.clone());
            }
        }
    }

    let expected = cluster.finalized_hash(3);
    for i in 0..4 {
        assert_eq!(cluster.finalized_hash(i), expected, "node {i}");
    }
}

/// Node 0 commits at view 0 while the others ask for view 1. Node 0
/// ignores the ChangeViews and answers with recovery bundles; once two
/// commits are known the committed-or-lost rule lets the others accept the
/// late preparations and finalize at view 0. Nobody ever changes view.
#[test]
fn committed_node_defends_its_view() {
    let tx_a = tx(b"defended block");
    let mut cluster = Cluster::with_transactions(4, &[tx_a]);
    cluster.start_all();

    // Honest proposal reaches everyone.
    cluster.fire(1);
    let proposal = cluster.take_outbox(1);
    for to in [0usize, 2, 3] {
        cluster.deliver(to, proposal[0].clone());
    }

    // All responses reach node 0 only: it alone gathers a preparation
    // quorum and commits. Its Commit broadcast is withheld.
    let mut responses = Vec::new();
    for i in [0usize, 2, 3] {
        responses.extend(cluster.take_outbox(i));
    }
    for payload in &responses {
        if payload.validator_index != 0 {
            cluster.deliver(0, payload.clone());
        }
    }
    assert!(cluster.nodes[0].context().commit_sent());
    let node0_commit = cluster.take_outbox(0);
    assert_eq!(node0_commit.len(), 1);
    assert_eq!(node0_commit[0].message_type(), MessageType::Commit);

    // The others time out; their ChangeViews never reach each other.
    for i in [1usize, 2, 3] {
        cluster.fire(i);
    }
    let change_views: Vec<Vec<ConsensusPayload>> = (0..4)
        .map(|i| {
            if i == 0 {
                Vec::new()
            } else {
                cluster.take_outbox(i)
            }
        })
        .collect();

    // First ChangeView hits node 0: committed, so it answers with a
    // recovery bundle and stays put.
    cluster.deliver(0, change_views[1][0].clone());
    assert_eq!(cluster.nodes[0].context().view_number, 0);
    let recovery_1 = cluster.take_outbox(0);
    assert_eq!(recovery_1[0].message_type(), MessageType::RecoveryMessage);
    for to in [1usize, 2, 3] {
        cluster.deliver(to, recovery_1[0].clone());
    }
    // The bundle delivered node 0's commit everywhere.
    for i in [1usize, 2, 3] {
        assert!(cluster.nodes[i].context().commit_payloads[0].is_some());
        assert_eq!(cluster.nodes[i].context().view_number, 0);
    }

    // Second ChangeView, second bundle: with a commit already known plus a
    // silent validator, the threshold is passed and the late preparations
    // get through. Nodes 2 and 3 commit at view 0.
    cluster.deliver(0, change_views[2][0].clone());
    let recovery_2 = cluster.take_outbox(0);
    for to in [1usize, 2, 3] {
        cluster.deliver(to, recovery_2[0].clone());
    }
    assert!(cluster.nodes[2].context().commit_sent());
    assert!(cluster.nodes[3].context().commit_sent());

    // Commits circulate; every node finalizes at view 0.
    let mut late_commits = Vec::new();
    for i in [2usize, 3] {
        late_commits.extend(
            cluster
                .take_outbox(i)
                .into_iter()
                .filter(|p| p.message_type() == MessageType::Commit),
        );
    }
    late_commits.extend(node0_commit);
    for payload in &late_commits {
        for to in 0..4 {
            if payload.validator_index as usize != to {
                cluster.deliver(to, payload.clone());
            }
        }
    }

    let expected = cluster.finalized_hash(0);
    for i in 0..4 {
        assert_eq!(cluster.finalized_hash(i), expected, "node {i}");
        // Nobody ever joined the view change.
        for payload in &cluster.nodes[i].host().broadcast_log {
            if let Message::ChangeView(cv) = &payload.message {
                assert_ne!(cv.reason, ChangeViewReason::ChangeAgreement);
            }
        }
        for view in cluster.commit_views(i) {
            assert_eq!(view, 0, "node {i} committed outside view 0");
        }
    }
}

/// An uncommitted node only answers recovery requests when it is one of
/// the F validators following the requester.
#[test]
fn recovery_replies_are_throttled() {
    let mut cluster = Cluster::with_transactions(4, &[tx(b"throttle")]);
    cluster.start_all();

    let request = craft_recovery_request(0, 1, 0);
    for to in [1usize, 2, 3] {
        cluster.deliver(to, request.clone());
    }

    // F = 1: only validator 1, the immediate successor of the requester,
    // replies.
    let reply = cluster.take_outbox(1);
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].message_type(), MessageType::RecoveryMessage);
    assert!(cluster.take_outbox(2).is_empty());
    assert!(cluster.take_outbox(3).is_empty());
}

/// A ChangeView targeting the current view or below is an implicit
/// recovery request, with the same throttling.
#[test]
fn stale_change_view_acts_as_recovery_request() {
    let mut cluster = Cluster::with_transactions(4, &[tx(b"stale cv")]);
    cluster.start_all();

    let stale = craft_change_view(3, 1, 0, 0);

    // (3 + 1) mod 4 = 0: node 0 is the eligible responder.
    cluster.deliver(0, stale.clone());
    let reply = cluster.take_outbox(0);
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].message_type(), MessageType::RecoveryMessage);

    cluster.deliver(1, stale);
    assert!(cluster.take_outbox(1).is_empty());

    // The stale request never lands in a slot.
    assert!(cluster.nodes[0].context().change_view_payloads[3].is_none());
}

/// After committing, a timeout produces a RecoveryMessage rather than a
/// ChangeView, and the timer is re-armed.
#[test]
fn committed_node_resends_recovery_on_timeout() {
    let tx_a = tx(b"resend recovery");
    let mut cluster = Cluster::with_transactions(4, &[tx_a]);
    cluster.start_all();

    cluster.fire(1);
    let proposal = cluster.take_outbox(1);
    for to in [0usize, 2, 3] {
        cluster.deliver(to, proposal[0].clone());
    }
    let mut responses = Vec::new();
    for i in [0usize, 2, 3] {
        responses.extend(cluster.take_outbox(i));
    }
    for payload in &responses {
        if payload.validator_index != 0 {
            cluster.deliver(0, payload.clone());
        }
    }
    assert!(cluster.nodes[0].context().commit_sent());
    cluster.drop_outbox(0);

    cluster.fire(0);
    let resent = cluster.take_outbox(0);
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].message_type(), MessageType::RecoveryMessage);
    assert!(cluster.timers[0].pending().is_some());
}
