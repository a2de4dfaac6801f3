//! Scripted network fake for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::client::Fetcher;
use super::types::{Request, Response};

pub const ORIGIN: &str = "http://localhost:3000";

pub fn origin() -> Url {
  Url::parse(ORIGIN).unwrap()
}

#[derive(Debug, Clone)]
enum Scripted {
  Respond(Response),
  Fail,
}

/// Fetcher that answers from a script keyed by `"METHOD path"`.
///
/// Unscripted requests fail as if the network were down. Each route keeps a
/// queue of answers; the last one repeats.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
  calls: Mutex<Vec<String>>,
  bodies: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, method: &str, path: &str, response: Response) -> &Self {
    self.push(method, path, Scripted::Respond(response))
  }

  pub fn fail(&self, method: &str, path: &str) -> &Self {
    self.push(method, path, Scripted::Fail)
  }

  /// Drop every scripted route, so all further requests fail.
  pub fn go_offline(&self) {
    self.routes.lock().unwrap().clear();
  }

  /// `"METHOD path"` of every request seen, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  /// Bodies of requests that carried one, in order.
  pub fn bodies(&self) -> Vec<Vec<u8>> {
    self.bodies.lock().unwrap().clone()
  }

  fn push(&self, method: &str, path: &str, answer: Scripted) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .entry(route(method, path))
      .or_default()
      .push_back(answer);
    self
  }
}

fn route(method: &str, path: &str) -> String {
  format!("{} {}", method.to_uppercase(), path)
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let key = route(&request.method, request.url.path());
    self.calls.lock().unwrap().push(key.clone());
    if let Some(body) = &request.body {
      self.bodies.lock().unwrap().push(body.clone());
    }

    let answer = {
      let mut routes = self.routes.lock().unwrap();
      match routes.get_mut(&key) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
      }
    };

    match answer {
      Some(Scripted::Respond(response)) => Ok(response),
      Some(Scripted::Fail) | None => Err(eyre!("network unreachable: {}", key)),
    }
  }
}
