//! Derived read-only views over the mirrored posts.

use serde::Serialize;

use crate::storage::{Post, Topic};

/// Posts under one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicGroup {
    /// The topic
    pub topic: Topic,
    /// Most upvoted first
    pub posts: Vec<Post>,
}

fn by_upvotes_desc(posts: &mut [Post]) {
    // Stable, so equal scores keep mirror order (newest first)
    posts.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
}

/// Posts written by `author`
pub fn posts_by_author(posts: &[Post], author: &str) -> Vec<Post> {
    posts.iter().filter(|p| p.author == author).cloned().collect()
}

/// Posts tagged with `topic_id`, most upvoted first
pub fn posts_by_topic(posts: &[Post], topic_id: i64) -> Vec<Post> {
    let mut matching: Vec<Post> = posts
        .iter()
        .filter(|p| p.topic.id == topic_id)
        .cloned()
        .collect();
    by_upvotes_desc(&mut matching);
    matching
}

/// One group per topic that has at least one post
///
/// With `only` set, at most the group for that topic is returned.
pub fn grouped_by_topic(posts: &[Post], topics: &[Topic], only: Option<i64>) -> Vec<TopicGroup> {
    topics
        .iter()
        .filter(|t| only.map_or(true, |id| t.id == id))
        .filter_map(|topic| {
            let posts = posts_by_topic(posts, topic.id);
            (!posts.is_empty()).then(|| TopicGroup {
                topic: topic.clone(),
                posts,
            })
        })
        .collect()
}

/// Case-insensitive substring match over title, content, author and topic
/// description; a blank query matches everything
pub fn search(posts: &[Post], query: &str) -> Vec<Post> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return posts.to_vec();
    }
    posts
        .iter()
        .filter(|p| {
            [&p.title, &p.content, &p.author, &p.topic.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}
