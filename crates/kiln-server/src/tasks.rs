//! Task graph: named build, watch and publish tasks and their composition.
//!
//! Tasks run as cooperative futures on the caller's event loop. `Parallel`
//! interleaves its children; `Series` runs them in order. A failing child is
//! logged as soon as it fails and the others keep running; the first error is
//! returned once the group is done. Fatal errors (the preview server failing)
//! end the group immediately.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};

use kiln_pipeline::{
    glob_base, BuildResult, Config, GlobMatcher, PipelineError, PipelineRunner, FONT, IMAGE,
    MARKUP, SCRIPT, STYLE,
};

use crate::server::{DevServer, DevServerConfig, ServerError};
use crate::watcher::{FileWatcher, WatchEvent};
use crate::websocket::ReloadHub;

/// A composable unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Run the pipeline for an asset class
    Build(String),

    /// Remove the output directory of an asset class
    Clean(String),

    /// Signal connected preview clients to reload
    Reload,

    /// Copy the build root to the publish root
    Publish,

    /// Run the live preview server
    Serve,

    /// Run the change watcher with the graph's subscriptions
    Watch,

    /// Run children one after another
    Series(Vec<Task>),

    /// Run children concurrently
    Parallel(Vec<Task>),
}

impl Task {
    /// Pipeline run for a class.
    pub fn build(class: &str) -> Self {
        Self::Build(class.to_string())
    }

    /// Output clean for a class.
    pub fn clean(class: &str) -> Self {
        Self::Clean(class.to_string())
    }
}

/// Names accepted by [`TaskGraph::named`].
pub const TASK_NAMES: &[&str] = &[
    STYLE,
    SCRIPT,
    IMAGE,
    FONT,
    MARKUP,
    "clean-images",
    "build",
    "watch",
    "publish",
];

/// A glob whose changes trigger a task.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSubscription {
    /// Asset class the subscription belongs to
    pub asset_class: String,

    /// Glob relative to the project root
    pub pattern: String,

    /// Task run once per matching event
    pub on_change: Task,
}

/// Errors that abort a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Watch error: {0}")]
    Watch(String),
}

impl TaskError {
    /// Whether the error ends the enclosing group instead of waiting on siblings.
    ///
    /// `watch` runs the server beside a watcher that never finishes, so a
    /// server failure would otherwise never surface.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

/// Named tasks over one pipeline runner, reload hub and preview server.
pub struct TaskGraph {
    runner: Arc<PipelineRunner>,
    hub: ReloadHub,
    server: DevServerConfig,
    subscriptions: Vec<WatchSubscription>,
}

impl TaskGraph {
    /// Create a graph with the default subscriptions for the runner's config.
    pub fn new(runner: Arc<PipelineRunner>, hub: ReloadHub, server: DevServerConfig) -> Self {
        let subscriptions = default_subscriptions(runner.config());
        Self {
            runner,
            hub,
            server,
            subscriptions,
        }
    }

    /// Replace the watch subscriptions.
    pub fn with_subscriptions(mut self, subscriptions: Vec<WatchSubscription>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    /// Current watch subscriptions.
    pub fn subscriptions(&self) -> &[WatchSubscription] {
        &self.subscriptions
    }

    /// Reload hub shared with the preview server.
    pub fn hub(&self) -> &ReloadHub {
        &self.hub
    }

    /// Resolve a task name.
    pub fn named(&self, name: &str) -> Result<Task, TaskError> {
        let task = match name {
            STYLE | SCRIPT | IMAGE | FONT | MARKUP => Task::build(name),
            "clean-images" => Task::clean(IMAGE),
            "build" => Task::Parallel(vec![
                Task::build(STYLE),
                Task::build(SCRIPT),
                Task::Series(vec![Task::clean(IMAGE), Task::build(IMAGE)]),
                Task::build(FONT),
                Task::build(MARKUP),
            ]),
            "watch" => Task::Parallel(vec![Task::Serve, Task::Watch]),
            "publish" => Task::Publish,
            other => return Err(TaskError::UnknownTask(other.to_string())),
        };
        Ok(task)
    }

    /// Run a task to completion.
    pub fn run<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, Result<Vec<BuildResult>, TaskError>> {
        Box::pin(async move {
            match task {
                Task::Build(class) => Ok(vec![self.runner.run(class).await?]),
                Task::Clean(class) => {
                    self.runner.clean(class).await?;
                    Ok(Vec::new())
                }
                Task::Reload => {
                    self.hub.notify_reload();
                    Ok(Vec::new())
                }
                Task::Publish => Ok(vec![self.runner.publish().await?]),
                Task::Serve => {
                    DevServer::new(self.server.clone(), self.hub.clone())
                        .start()
                        .await?;
                    Ok(Vec::new())
                }
                Task::Watch => {
                    self.watch().await?;
                    Ok(Vec::new())
                }
                Task::Series(tasks) => {
                    let mut outcomes = Vec::with_capacity(tasks.len());
                    for task in tasks {
                        let outcome = self.run(task).await;
                        if let Err(e) = &outcome {
                            if e.is_fatal() {
                                return outcome;
                            }
                            tracing::error!("{}", e);
                        }
                        outcomes.push(outcome);
                    }
                    collect(outcomes)
                }
                Task::Parallel(tasks) => {
                    let mut running: FuturesUnordered<_> =
                        tasks.iter().map(|task| self.run(task)).collect();
                    let mut outcomes = Vec::with_capacity(tasks.len());
                    while let Some(outcome) = running.next().await {
                        if let Err(e) = &outcome {
                            if e.is_fatal() {
                                return outcome;
                            }
                            tracing::error!("{}", e);
                        }
                        outcomes.push(outcome);
                    }
                    collect(outcomes)
                }
            }
        })
    }

    /// Directories to watch: the literal bases of all subscription globs.
    fn watch_dirs(&self) -> Vec<PathBuf> {
        let root = &self.runner.config().root;
        self.subscriptions
            .iter()
            .map(|s| root.join(glob_base(&s.pattern)))
            .collect()
    }

    /// Subscriptions matching a changed path, in declaration order.
    fn matching<'a>(
        &'a self,
        matchers: &[(GlobMatcher, &'a WatchSubscription)],
        event: &WatchEvent,
    ) -> Vec<&'a WatchSubscription> {
        matchers
            .iter()
            .filter(|(matcher, _)| matcher.matches(event.path()))
            .map(|(_, subscription)| *subscription)
            .collect()
    }

    /// Run the tasks of every subscription matching one event.
    ///
    /// Subscriptions sharing a glob run in declaration order, so the image
    /// clean finishes before the image build for the same change.
    async fn handle_event(&self, event: WatchEvent, subscriptions: Vec<&WatchSubscription>) {
        tracing::info!("Changed: {}", event.path().display());

        for subscription in subscriptions {
            // Failures inside the task are already logged
            if let Err(e) = self.run(&subscription.on_change).await {
                tracing::debug!("{} task failed: {}", subscription.asset_class, e);
            }
        }
    }

    /// Watch all subscriptions until the process is terminated.
    pub async fn watch(&self) -> Result<(), TaskError> {
        let root = &self.runner.config().root;

        let mut matchers = Vec::with_capacity(self.subscriptions.len());
        for subscription in &self.subscriptions {
            let matcher = GlobMatcher::new(root, &subscription.pattern)
                .map_err(|e| TaskError::Watch(e.to_string()))?;
            matchers.push((matcher, subscription));
        }

        let (_watcher, mut rx) =
            FileWatcher::new(&self.watch_dirs()).map_err(|e| TaskError::Watch(e.to_string()))?;

        tracing::info!("Watching {} subscriptions", self.subscriptions.len());

        let mut in_flight = FuturesUnordered::new();
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        return Err(TaskError::Watch("file watcher stopped".to_string()));
                    };
                    let subscriptions = self.matching(&matchers, &event);
                    if !subscriptions.is_empty() {
                        in_flight.push(self.handle_event(event, subscriptions));
                    }
                }
                Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
            }
        }
    }
}

/// Merge child outcomes, keeping every result and the first error.
fn collect(
    outcomes: Vec<Result<Vec<BuildResult>, TaskError>>,
) -> Result<Vec<BuildResult>, TaskError> {
    let mut results = Vec::new();
    let mut first_error = None;

    for outcome in outcomes {
        match outcome {
            Ok(r) => results.extend(r),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

/// Rebuild-then-reload subscriptions for every configured class.
///
/// Images get two subscriptions on the same glob: clean, then build.
pub fn default_subscriptions(config: &Config) -> Vec<WatchSubscription> {
    let mut subscriptions = Vec::new();

    for class in [STYLE, IMAGE, SCRIPT, MARKUP, FONT] {
        let Some(asset) = config.class(class) else {
            continue;
        };

        let subscribe = |task: Task| WatchSubscription {
            asset_class: asset.name.clone(),
            pattern: asset.watch.clone(),
            on_change: Task::Series(vec![task, Task::Reload]),
        };

        if class == IMAGE {
            subscriptions.push(subscribe(Task::clean(class)));
        }
        subscriptions.push(subscribe(Task::build(class)));
    }

    subscriptions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::ReloadMessage;
    use kiln_pipeline::{RecordingNotifier, RegistryError};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn graph(root: &Path) -> TaskGraph {
        let runner = PipelineRunner::new(
            Config::with_root(root),
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap();
        TaskGraph::new(Arc::new(runner), ReloadHub::new(), DevServerConfig::default())
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn resolves_every_task_name() {
        let temp = tempdir().unwrap();
        let graph = graph(temp.path());

        for name in TASK_NAMES {
            assert!(graph.named(name).is_ok(), "{} should resolve", name);
        }
        assert!(matches!(graph.named("deploy"), Err(TaskError::UnknownTask(_))));
    }

    #[test]
    fn build_cleans_images_before_optimizing() {
        let temp = tempdir().unwrap();
        let Task::Parallel(children) = graph(temp.path()).named("build").unwrap() else {
            panic!("build should be parallel");
        };

        assert!(children.contains(&Task::Series(vec![Task::clean(IMAGE), Task::build(IMAGE)])));
        assert_eq!(children.len(), 5);
    }

    #[test]
    fn subscribes_images_twice() {
        let subscriptions = default_subscriptions(&Config::default());
        let image: Vec<&WatchSubscription> = subscriptions
            .iter()
            .filter(|s| s.asset_class == IMAGE)
            .collect();

        assert_eq!(subscriptions.len(), 6);
        assert_eq!(image.len(), 2);
        assert_eq!(image[0].pattern, image[1].pattern);
        assert_eq!(
            image[0].on_change,
            Task::Series(vec![Task::clean(IMAGE), Task::Reload])
        );
        assert_eq!(
            image[1].on_change,
            Task::Series(vec![Task::build(IMAGE), Task::Reload])
        );
    }

    #[tokio::test]
    async fn build_runs_every_class() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/scss/main.scss", ".btn { color: red; }");
        write(temp.path(), "src/js/app.js", "console.log(1);");
        write(temp.path(), "src/index.html", r#"<a class="btn">"#);
        let graph = graph(temp.path());

        let results = graph.run(&graph.named("build").unwrap()).await.unwrap();

        let mut classes: Vec<&str> = results.iter().map(|r| r.asset_class.as_str()).collect();
        classes.sort();
        assert_eq!(classes, vec![FONT, IMAGE, MARKUP, SCRIPT, STYLE]);
        assert!(temp.path().join("dist/css/main.min.css").exists());
        assert!(temp.path().join("dist/js/app.min.js").exists());
        assert!(temp.path().join("dist/index.html").exists());
    }

    #[tokio::test]
    async fn parallel_does_not_short_circuit() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/index.html", "<p>hi</p>");
        let graph = graph(temp.path());

        let task = Task::Parallel(vec![Task::build("video"), Task::build(MARKUP)]);
        let err = graph.run(&task).await.unwrap_err();

        assert!(matches!(
            err,
            TaskError::Pipeline(PipelineError::Registry(RegistryError::UnknownAssetClass(_)))
        ));
        assert!(temp.path().join("dist/index.html").exists());
    }

    #[tokio::test]
    async fn series_reloads_after_failed_build() {
        let temp = tempdir().unwrap();
        let graph = graph(temp.path());
        let mut rx = graph.hub().subscribe();

        // src/js is missing, so the build itself errors
        let task = Task::Series(vec![Task::build(SCRIPT), Task::Reload]);
        assert!(graph.run(&task).await.is_err());

        assert!(rx.try_recv().is_ok(), "reload should still be sent");
    }

    #[tokio::test]
    async fn image_change_cleans_then_rebuilds() {
        let temp = tempdir().unwrap();
        let images = temp.path().join("src/images");
        fs::create_dir_all(&images).unwrap();
        image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255]))
            .save(images.join("logo.png"))
            .unwrap();
        write(temp.path(), "dist/images/stale.png", "old");
        let graph = graph(temp.path());
        let mut rx = graph.hub().subscribe();

        let matchers: Vec<(GlobMatcher, &WatchSubscription)> = graph
            .subscriptions()
            .iter()
            .map(|s| (GlobMatcher::new(temp.path(), &s.pattern).unwrap(), s))
            .collect();
        let event = WatchEvent::Modified(images.join("logo.png"));
        let matched = graph.matching(&matchers, &event);
        assert_eq!(matched.len(), 2);

        graph.handle_event(event, matched).await;

        assert!(!temp.path().join("dist/images/stale.png").exists());
        assert!(temp.path().join("dist/images/logo.png").exists());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn style_change_matches_only_styles() {
        let temp = tempdir().unwrap();
        let graph = graph(temp.path());
        let matchers: Vec<(GlobMatcher, &WatchSubscription)> = graph
            .subscriptions()
            .iter()
            .map(|s| (GlobMatcher::new(temp.path(), &s.pattern).unwrap(), s))
            .collect();

        let event = WatchEvent::Modified(temp.path().join("src/scss/base/_type.scss"));
        let matched = graph.matching(&matchers, &event);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].asset_class, STYLE);
    }

    #[tokio::test]
    async fn publishes_after_build() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/index.html", "<p>hi</p>");
        let graph = graph(temp.path());

        let task = Task::Series(vec![Task::build(MARKUP), Task::Publish]);
        graph.run(&task).await.unwrap();

        assert!(temp.path().join("docs/index.html").exists());
    }

    #[tokio::test]
    async fn watch_fails_when_server_cannot_bind() {
        let temp = tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let runner = PipelineRunner::new(
            Config::with_root(temp.path()),
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap();
        let server = DevServerConfig {
            serve_dir: temp.path().join("dist"),
            port,
            open: false,
            ..DevServerConfig::default()
        };
        let graph = TaskGraph::new(Arc::new(runner), ReloadHub::new(), server);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            graph.run(&graph.named("watch").unwrap()),
        )
        .await
        .expect("watch should end when the server fails");

        assert!(matches!(
            outcome,
            Err(TaskError::Server(ServerError::BindError(..)))
        ));
    }

    #[tokio::test]
    async fn watch_rebuilds_and_reloads_on_change() {
        let temp = tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        write(&root, "src/index.html", "<p>old</p>");
        let graph = graph(&root);
        let mut rx = graph.hub().subscribe();

        let change = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            // Replace atomically so no event sees a half-written file
            write(&root, "src/index.html.tmp", "<p>new</p>");
            fs::rename(root.join("src/index.html.tmp"), root.join("src/index.html")).unwrap();
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await
        };

        tokio::select! {
            stopped = graph.watch() => panic!("watch stopped: {:?}", stopped),
            received = change => {
                assert!(matches!(received, Ok(Ok(ReloadMessage::Reload))));
            }
        }
        assert_eq!(
            fs::read_to_string(root.join("dist/index.html")).unwrap(),
            "<p>new</p>"
        );
    }
}
