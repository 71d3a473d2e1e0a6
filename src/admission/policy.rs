//! Named rate-limit policies and path mapping.
//!
//! Each policy is a window length plus a request ceiling. Auth-adjacent
//! paths get the strict policy, API paths the generic one, everything
//! else the public one; the bot policy is applied to requests flagged by
//! the bot heuristic instead of their path policy.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicies {
    pub auth: RateLimitPolicy,
    pub api: RateLimitPolicy,
    pub public: RateLimitPolicy,
    pub bot: RateLimitPolicy,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        Self {
            auth: RateLimitPolicy {
                name: "auth",
                window: Duration::from_secs(300),
                max_requests: 10,
            },
            api: RateLimitPolicy {
                name: "api",
                window: Duration::from_secs(60),
                max_requests: 120,
            },
            public: RateLimitPolicy {
                name: "public",
                window: Duration::from_secs(60),
                max_requests: 180,
            },
            // Punitive: long window, low ceiling.
            bot: RateLimitPolicy {
                name: "bot",
                window: Duration::from_secs(600),
                max_requests: 10,
            },
        }
    }
}

impl RateLimitPolicies {
    /// Policy for a request path.
    pub fn for_path(&self, path: &str) -> &RateLimitPolicy {
        if path.starts_with("/admin") || path.starts_with("/api/auth") || path == "/login" {
            &self.auth
        } else if path.starts_with("/api") {
            &self.api
        } else {
            &self.public
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_paths_get_the_strict_policy() {
        let policies = RateLimitPolicies::default();

        assert_eq!(policies.for_path("/admin/settings").name, "auth");
        assert_eq!(policies.for_path("/api/auth/login").name, "auth");
        assert_eq!(policies.for_path("/login").name, "auth");
    }

    #[test]
    fn api_paths_get_the_generic_policy() {
        let policies = RateLimitPolicies::default();
        assert_eq!(policies.for_path("/api/posts").name, "api");
    }

    #[test]
    fn everything_else_is_public() {
        let policies = RateLimitPolicies::default();
        assert_eq!(policies.for_path("/posts/hello").name, "public");
        assert_eq!(policies.for_path("/").name, "public");
    }

    #[test]
    fn bot_policy_is_the_most_restrictive() {
        let policies = RateLimitPolicies::default();
        assert!(policies.bot.max_requests <= policies.auth.max_requests);
        assert!(policies.bot.window >= policies.public.window);
    }
}
