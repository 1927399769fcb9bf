//! Usage keys: `block-v1:ORG+COURSE+RUN+type@TYPE+block@ID` and course keys
//! `course-v1:ORG+COURSE+RUN`.
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::model::Category;

static BLOCK_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^block-v1:(?P<org>[^+]+)\+(?P<course>[^+]+)\+(?P<run>[^+]+)\+type@(?P<type>[A-Za-z0-9_-]+)\+block@(?P<block>[A-Za-z0-9_.-]+)$")
        .expect("valid block key regex")
});

static COURSE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^course-v1:(?P<org>[^+]+)\+(?P<course>[^+]+)\+(?P<run>[^+]+)$")
        .expect("valid course key regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockKey {
    pub org: String,
    pub course: String,
    pub run: String,
    pub block_type: String,
    pub block: String,
}

impl BlockKey {
    pub fn parse(key: &str) -> Option<Self> {
        let caps = BLOCK_KEY.captures(key)?;
        Some(Self {
            org: caps["org"].to_string(),
            course: caps["course"].to_string(),
            run: caps["run"].to_string(),
            block_type: caps["type"].to_string(),
            block: caps["block"].to_string(),
        })
    }

    pub fn category(&self) -> Option<Category> {
        Category::parse(&self.block_type)
    }

    pub fn course_key(&self) -> String {
        format!("course-v1:{}+{}+{}", self.org, self.course, self.run)
    }

    /// A fresh key for a new block of `category` in the same course.
    pub fn sibling(&self, category: Category) -> String {
        format!(
            "block-v1:{}+{}+{}+type@{}+block@{}",
            self.org,
            self.course,
            self.run,
            category.block_type(),
            Uuid::new_v4().simple()
        )
    }
}

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block-v1:{}+{}+{}+type@{}+block@{}",
            self.org, self.course, self.run, self.block_type, self.block
        )
    }
}

pub fn is_course_key(key: &str) -> bool {
    COURSE_KEY.is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_key() {
        let key = BlockKey::parse("block-v1:OpenedX+DemoX+2024+type@vertical+block@abc123").unwrap();
        assert_eq!(key.org, "OpenedX");
        assert_eq!(key.run, "2024");
        assert_eq!(key.category(), Some(Category::Unit));
        assert_eq!(key.course_key(), "course-v1:OpenedX+DemoX+2024");
        assert_eq!(
            key.to_string(),
            "block-v1:OpenedX+DemoX+2024+type@vertical+block@abc123"
        );
    }

    #[test]
    fn sibling_keys_are_unique_and_parse() {
        let key = BlockKey::parse("block-v1:O+C+R+type@sequential+block@s1").unwrap();
        let a = key.sibling(Category::Unit);
        let b = key.sibling(Category::Unit);
        assert_ne!(a, b);
        let parsed = BlockKey::parse(&a).unwrap();
        assert_eq!(parsed.block_type, "vertical");
        assert_eq!(parsed.course_key(), "course-v1:O+C+R");
    }

    #[test]
    fn rejects_malformed() {
        assert!(BlockKey::parse("block-v1:O+C+type@vertical+block@x").is_none());
        assert!(BlockKey::parse("u1").is_none());
        assert!(is_course_key("course-v1:O+C+R"));
        assert!(!is_course_key("course-v1:O+C"));
    }
}
