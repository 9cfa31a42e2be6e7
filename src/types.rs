//! Wire and data-model types shared across the HTTP router, state
//! broadcaster, and PTY manager.

use serde::{Deserialize, Serialize};

/// A tmux session as enumerated by the tmux coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TmuxSession {
    pub name: String,
    pub created: i64,
    #[serde(rename = "windowCount")]
    pub window_count: u32,
    #[serde(rename = "attachedClients")]
    pub attached_clients: u32,
    #[serde(rename = "currentPath")]
    pub current_path: String,
}

/// A single panel within a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PanelSnapshot {
    pub id: String,
    pub directory: String,
    #[serde(rename = "tmuxSession", skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
}

/// Recursive split-tree describing how panels are arranged within a
/// workspace. Opaque beyond shape: the host owns meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutNode {
    Pane { pane: PaneLayout },
    Split { split: Box<SplitLayout> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaneLayout {
    #[serde(rename = "panelIds")]
    pub panel_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitLayout {
    pub orientation: Orientation,
    #[serde(rename = "dividerPosition")]
    pub divider_position: f64,
    pub first: LayoutNode,
    pub second: LayoutNode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

/// A workspace snapshot as returned by `GET /api/workspaces` and embedded
/// in state broadcasts. `selected_workspace` and `layout` are treated as
/// opaque payloads the host alone interprets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceSnapshot {
    pub id: String,
    pub title: String,
    pub directory: String,
    #[serde(rename = "panelCount")]
    pub panel_count: u32,
    #[serde(rename = "unreadCount")]
    pub unread_count: u32,
    #[serde(rename = "isPinned")]
    pub is_pinned: bool,
    #[serde(rename = "isTmuxEnabled")]
    pub is_tmux_enabled: bool,
    #[serde(rename = "isSelected")]
    pub is_selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panels: Option<Vec<PanelSnapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutNode>,
}

/// A notification forwarded from the host to all state clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSnapshot {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub body: String,
    #[serde(rename = "tabId")]
    pub tab_id: String,
    #[serde(rename = "isRead")]
    pub is_read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// `GET /api/status` response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(rename = "workspaceCount")]
    pub workspace_count: u32,
    #[serde(rename = "selectedWorkspace", skip_serializing_if = "Option::is_none")]
    pub selected_workspace: Option<String>,
    #[serde(rename = "unreadCount")]
    pub unread_count: u32,
    #[serde(rename = "connectedClients")]
    pub connected_clients: u32,
    pub port: u16,
    pub uptime: u64,
}

/// Messages sent from server to state clients on `/ws`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StateOutbound {
    State {
        data: Vec<WorkspaceSnapshot>,
        #[serde(rename = "tmuxSessions")]
        tmux_sessions: Vec<TmuxSession>,
    },
    Notification {
        #[serde(flatten)]
        notification: NotificationSnapshot,
    },
    Ping,
}

/// Messages received from state clients on `/ws`. Anything that isn't
/// `pong` is forwarded to the command bridge as-is, so this only
/// distinguishes the one message the protocol special-cases.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StateInboundTagged {
    Pong,
}

/// Messages sent from server to terminal clients on `/ws/terminal`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PtyOutbound {
    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Reconnected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    ReconnectFailed,
    Ping,
}

/// Messages received from terminal clients on `/ws/terminal`. Frames
/// that don't parse as a JSON object with a recognized `type` fall back
/// to raw keystroke input, handled separately from this enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PtyInbound {
    Init {
        dir: Option<String>,
        cols: Option<u16>,
        rows: Option<u16>,
        tmux: Option<String>,
    },
    Reconnect {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Input {
        data: String,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_node_round_trips_through_json() {
        let node = LayoutNode::Split {
            split: Box::new(SplitLayout {
                orientation: Orientation::Vertical,
                divider_position: 0.5,
                first: LayoutNode::Pane {
                    pane: PaneLayout {
                        panel_ids: vec!["p1".into()],
                    },
                },
                second: LayoutNode::Pane {
                    pane: PaneLayout {
                        panel_ids: vec!["p2".into()],
                    },
                },
            }),
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: LayoutNode = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }

    #[test]
    fn pty_inbound_init_defaults_are_optional() {
        let v: PtyInbound = serde_json::from_str(r#"{"type":"init","dir":"/tmp"}"#).unwrap();
        match v {
            PtyInbound::Init {
                dir,
                cols,
                rows,
                tmux,
            } => {
                assert_eq!(dir.as_deref(), Some("/tmp"));
                assert_eq!(cols, None);
                assert_eq!(rows, None);
                assert_eq!(tmux, None);
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn state_outbound_state_message_shape() {
        let msg = StateOutbound::State {
            data: vec![],
            tmux_sessions: vec![],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["tmuxSessions"], serde_json::json!([]));
    }
}
