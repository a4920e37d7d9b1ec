//! Feed data model: posts, reactions, comments, shares and the per-post
//! interaction state the optimistic engine mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub type PostId = String;
pub type UserId = String;
pub type CommentId = String;

/// Accept ids sent either as JSON strings or numbers; store them as strings
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    #[serde(deserialize_with = "id_from_any")]
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl UserRef {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            avatar: None,
        }
    }
}

/// A feed post. Share wrappers carry the reshared post in `original_post`;
/// every interaction addresses that original, never the wrapper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(deserialize_with = "id_from_any")]
    pub id: PostId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub author: UserRef,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub sharer: Option<UserRef>,
    #[serde(default)]
    pub shared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_post: Option<Box<Post>>,
    // Counts are lazily populated and may be missing from a page
    #[serde(default)]
    pub reactions_count: Option<usize>,
    #[serde(default)]
    pub comments_count: Option<usize>,
    #[serde(default)]
    pub shares_count: Option<usize>,
    #[serde(default)]
    pub has_user_shared: bool,
}

impl Post {
    /// The post interactions act on: the original for a share, else itself.
    ///
    /// A share wrapper whose original is missing resolves to the wrapper so
    /// that there is always exactly one target.
    pub fn target(&self) -> &Post {
        match (&self.is_shared, &self.original_post) {
            (true, Some(original)) => original.target(),
            _ => self,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target().id
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author.id == user_id
    }

    /// Share time for shares, creation time for originals
    pub fn sort_timestamp(&self) -> DateTime<Utc> {
        if self.is_shared {
            self.shared_at.unwrap_or(self.created_at)
        } else {
            self.created_at
        }
    }

    /// Who reshared this post, if it is a share wrapper
    pub fn reposted_by(&self) -> Option<&UserRef> {
        if self.is_shared {
            self.sharer.as_ref()
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    /// Created by a plain toggle
    #[default]
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRecord {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub user: UserRef,
    #[serde(default, rename = "type")]
    pub reaction_type: ReactionType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_optimistic: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "id_from_any")]
    pub id: CommentId,
    pub text: String,
    pub author: UserRef,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub is_optimistic: bool,
}

impl Comment {
    /// Number of comments in this thread, the comment itself included
    pub fn thread_len(&self) -> usize {
        1 + self.replies.iter().map(Comment::thread_len).sum::<usize>()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub user: UserRef,
    pub shared_at: DateTime<Utc>,
    #[serde(default)]
    pub is_optimistic: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareDetails {
    #[serde(default)]
    pub shares: Vec<ShareRecord>,
    #[serde(default)]
    pub total_shares: usize,
    #[serde(default)]
    pub has_user_shared: bool,
}

/// Everything the viewer can see and change about one target post
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionState {
    /// One record per user
    pub reactions: HashMap<UserId, ReactionRecord>,
    /// The viewing user's own reaction
    pub user_reaction: Option<ReactionRecord>,
    pub comments: Vec<Comment>,
    pub share_details: ShareDetails,
}

impl InteractionState {
    /// Build authoritative state from the three lazy fetches
    pub fn from_parts(
        viewer_id: &str,
        reactions: Vec<ReactionRecord>,
        comments: Vec<Comment>,
        share_details: ShareDetails,
    ) -> Self {
        let mut state = Self {
            comments,
            share_details,
            ..Default::default()
        };
        state.replace_reactions(viewer_id, reactions);
        state
    }

    /// Swap in a freshly fetched reaction list. Later duplicates for the same
    /// user win, matching the one-reaction-per-user rule.
    pub fn replace_reactions(&mut self, viewer_id: &str, reactions: Vec<ReactionRecord>) {
        self.reactions = reactions
            .into_iter()
            .map(|r| (r.user.id.clone(), r))
            .collect();
        self.user_reaction = self.reactions.get(viewer_id).cloned();
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    pub fn has_reacted(&self) -> bool {
        self.user_reaction.is_some()
    }

    /// Comments plus every nested reply
    pub fn total_comment_count(&self) -> usize {
        self.comments.iter().map(Comment::thread_len).sum()
    }

    pub fn find_comment(&self, comment_id: &str) -> Option<&Comment> {
        fn walk<'a>(list: &'a [Comment], id: &str) -> Option<&'a Comment> {
            list.iter().find_map(|c| {
                if c.id == id {
                    Some(c)
                } else {
                    walk(&c.replies, id)
                }
            })
        }
        walk(&self.comments, comment_id)
    }

    pub fn find_comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        fn walk<'a>(list: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
            for comment in list.iter_mut() {
                if comment.id == id {
                    return Some(comment);
                }
                if let Some(found) = walk(&mut comment.replies, id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&mut self.comments, comment_id)
    }

    /// Remove a comment or reply wherever it sits in the tree
    pub fn remove_comment(&mut self, comment_id: &str) -> Option<Comment> {
        fn walk(list: &mut Vec<Comment>, id: &str) -> Option<Comment> {
            if let Some(pos) = list.iter().position(|c| c.id == id) {
                return Some(list.remove(pos));
            }
            list.iter_mut().find_map(|c| walk(&mut c.replies, id))
        }
        walk(&mut self.comments, comment_id)
    }
}
