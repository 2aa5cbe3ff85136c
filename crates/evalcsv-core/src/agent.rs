use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::agents::weather::WeatherAgent;
use crate::error::Error;
use crate::types::{Content, Invocation};

/// An agent under evaluation: answers one user turn.
#[async_trait]
pub trait Agent: Send + Sync {
	fn name(&self) -> &str;

	/// Produce the actual invocation (final response plus any tool calls)
	/// for `user_content`.
	async fn invoke(&self, user_content: &Content) -> Result<Invocation>;
}

/// Wrap an async closure as an `Agent`.
pub fn from_async_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Agent>
where
	F: Send + Sync + 'static + Fn(&Content) -> Fut,
	Fut: Future<Output = Result<Invocation>> + Send + 'static,
{
	struct ClosureAgent<F> {
		name: String,
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Agent for ClosureAgent<F>
	where
		F: Send + Sync + 'static + Fn(&Content) -> Fut,
		Fut: Future<Output = Result<Invocation>> + Send + 'static,
	{
		fn name(&self) -> &str {
			&self.name
		}

		async fn invoke(&self, user_content: &Content) -> Result<Invocation> {
			(self.f)(user_content).await
		}
	}

	Arc::new(ClosureAgent { name: name.into(), f })
}

/// Agents addressable by module name.
#[derive(Default, Clone)]
pub struct AgentRegistry {
	agents: BTreeMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry holding `weather_agent` and `weather_agent_en`.
	pub fn with_builtin_agents() -> Self {
		let mut registry = Self::new();
		registry.register("weather_agent", Arc::new(WeatherAgent::zh_tw()));
		registry.register("weather_agent_en", Arc::new(WeatherAgent::en()));
		registry
	}

	pub fn register(&mut self, module_name: impl Into<String>, agent: Arc<dyn Agent>) {
		self.agents.insert(module_name.into(), agent);
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.agents.keys().map(String::as_str)
	}

	/// Resolve a module name. Trailing path separators and a `.agent`
	/// suffix are tolerated, so `weather_agent/` and `weather_agent.agent`
	/// resolve like `weather_agent`.
	pub fn load(&self, module_name: &str) -> Result<Arc<dyn Agent>, Error> {
		let key = module_name.trim_end_matches(['/', '\\']);
		let key = key.strip_suffix(".agent").unwrap_or(key);
		self.agents.get(key).cloned().ok_or_else(|| Error::AgentLoad {
			name: module_name.to_string(),
			available: self.names().collect::<Vec<_>>().join(", "),
		})
	}
}
