//! Dispatch topic definitions

/// Topic patterns addressing the bricks services
pub struct Topics;

impl Topics {
    /// Conductor manager topic for a specific host
    pub fn conductor(host: &str) -> String {
        format!("bricks/conductor/{}", host)
    }

    /// Shared conductor topic; any active conductor may pick the
    /// message up
    pub fn conductor_shared() -> String {
        "bricks/conductor".to_string()
    }

    /// Mortar manager topic for a specific host
    pub fn mortar(host: &str) -> String {
        format!("bricks/mortar/{}", host)
    }

    /// Shared mortar worker topic; any agent may pick the message up
    pub fn mortar_shared() -> String {
        "bricks/mortar".to_string()
    }

    /// Parse a topic to extract the host
    pub fn parse_host(topic: &str) -> Option<String> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() >= 3 && parts[0] == "bricks" {
            Some(parts[2].to_string())
        } else {
            None
        }
    }

    /// Check if topic addresses a conductor
    pub fn is_conductor_topic(topic: &str) -> bool {
        topic.starts_with("bricks/conductor/")
    }

    /// Check if topic addresses a mortar agent
    pub fn is_mortar_topic(topic: &str) -> bool {
        topic == "bricks/mortar" || topic.starts_with("bricks/mortar/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_generation() {
        assert_eq!(Topics::conductor("cond-1"), "bricks/conductor/cond-1");
        assert_eq!(Topics::mortar("compute-7"), "bricks/mortar/compute-7");
    }

    #[test]
    fn test_topic_parsing() {
        assert_eq!(
            Topics::parse_host("bricks/conductor/cond-1"),
            Some("cond-1".to_string())
        );
        assert_eq!(Topics::parse_host("bricks/mortar"), None);
        assert_eq!(Topics::conductor_shared(), "bricks/conductor");
        assert!(Topics::is_mortar_topic("bricks/mortar"));
        assert!(Topics::is_mortar_topic("bricks/mortar/compute-7"));
        assert!(!Topics::is_conductor_topic("bricks/mortar/compute-7"));
    }
}
