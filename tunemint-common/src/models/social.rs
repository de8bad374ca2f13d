//! Accounts, profiles and the social graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::market::Currency;

/// Registered wallet account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    /// Normalized wallet address
    pub address: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// All registered accounts, keyed by address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDirectory {
    #[serde(default)]
    pub accounts: BTreeMap<String, UserAccount>,
}

impl UserDirectory {
    /// Whether a username is already taken (case-insensitive)
    pub fn username_taken(&self, username: &str) -> bool {
        self.accounts
            .values()
            .any(|a| a.username.eq_ignore_ascii_case(username))
    }
}

/// Counters shown on a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileStats {
    #[serde(default)]
    pub tracks_generated: u64,
    #[serde(default)]
    pub tracks_shared: u64,
    #[serde(default)]
    pub plays: u64,
}

/// Public profile, one file per address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// `https://` URL or `data:image/...;base64,` payload
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
    #[serde(default)]
    pub stats: ProfileStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(address: &str) -> Self {
        let now = Utc::now();
        Self {
            address: address.to_string(),
            display_name: None,
            bio: None,
            avatar: None,
            social_links: BTreeMap::new(),
            stats: ProfileStats::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trade details attached to a chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeOffer {
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    pub track_id: Uuid,
    pub price: f64,
    pub currency: Currency,
}

/// Community chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<TradeOffer>,
}

/// Chat history, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLog {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatLog {
    /// Append a message, dropping the oldest ones beyond `cap`
    pub fn push(&mut self, message: ChatMessage, cap: usize) {
        self.messages.push(message);
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
    }

    /// The last `limit` messages newer than `since`, oldest first
    pub fn recent(&self, limit: usize, since: Option<DateTime<Utc>>) -> Vec<ChatMessage> {
        let filtered: Vec<&ChatMessage> = self
            .messages
            .iter()
            .filter(|m| since.map_or(true, |s| m.timestamp > s))
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }
}

/// Likers per track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LikeBook {
    #[serde(default)]
    pub likes: BTreeMap<Uuid, BTreeSet<String>>,
}

impl LikeBook {
    /// Like or unlike; returns `(liked_now, like_count)`
    pub fn toggle(&mut self, track_id: Uuid, address: &str) -> (bool, usize) {
        let likers = self.likes.entry(track_id).or_default();
        let liked = if likers.remove(address) {
            false
        } else {
            likers.insert(address.to_string());
            true
        };
        let count = likers.len();
        if likers.is_empty() {
            self.likes.remove(&track_id);
        }
        (liked, count)
    }

    pub fn count(&self, track_id: &Uuid) -> usize {
        self.likes.get(track_id).map_or(0, |l| l.len())
    }

    pub fn has_liked(&self, track_id: &Uuid, address: &str) -> bool {
        self.likes
            .get(track_id)
            .map_or(false, |l| l.contains(address))
    }
}

/// Following/followers lists for one address
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FollowEdges {
    #[serde(default)]
    pub following: BTreeSet<String>,
    #[serde(default)]
    pub followers: BTreeSet<String>,
}

/// Follow relations for every address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowGraph {
    #[serde(default)]
    pub nodes: BTreeMap<String, FollowEdges>,
}

impl FollowGraph {
    /// Follow or unfollow; returns whether `follower` now follows `target`
    ///
    /// Both sides of the edge are updated together.
    pub fn toggle(&mut self, follower: &str, target: &str) -> bool {
        let now_following = {
            let edges = self.nodes.entry(follower.to_string()).or_default();
            if edges.following.remove(target) {
                false
            } else {
                edges.following.insert(target.to_string());
                true
            }
        };

        let target_edges = self.nodes.entry(target.to_string()).or_default();
        if now_following {
            target_edges.followers.insert(follower.to_string());
        } else {
            target_edges.followers.remove(follower);
        }

        self.nodes.retain(|_, e| !e.following.is_empty() || !e.followers.is_empty());
        now_following
    }

    pub fn edges(&self, address: &str) -> FollowEdges {
        self.nodes.get(address).cloned().unwrap_or_default()
    }
}
