//! Initialize a kiln project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Files written by `kiln init`, relative to the project root.
const SKELETON: &[(&str, &str)] = &[
    ("kiln.toml", DEFAULT_CONFIG),
    ("src/index.html", DEFAULT_INDEX),
    ("src/scss/main.scss", DEFAULT_MAIN_SCSS),
    ("src/scss/_variables.scss", DEFAULT_VARIABLES_SCSS),
    ("src/js/main.js", DEFAULT_MAIN_JS),
];

/// Directories created empty.
const EMPTY_DIRS: &[&str] = &["src/images", "src/fonts"];

/// Run the init command.
pub fn run(root: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing kiln in {}", root.display());

    for (relative, contents) in SKELETON {
        let path = root.join(relative);
        if path.exists() && !yes {
            tracing::warn!("{} already exists. Use --yes to overwrite.", relative);
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", relative))?;
        tracing::info!("Created {}", relative);
    }

    for relative in EMPTY_DIRS {
        fs::create_dir_all(root.join(relative))
            .with_context(|| format!("Failed to create {}", relative))?;
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'kiln watch' to start the preview server.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# kiln configuration

[paths]
# Build output root
build = "dist"

# Copy of the build output for static hosting
publish = "docs"

# Markup scanned for used selectors when purging CSS
purge = "src/**/*.html"

[style]
src = "src/scss/main.scss"
watch = "src/scss/**/*.scss"
dest = "dist/css"
browsers = ["last 2 versions", "> 5%", "Firefox ESR"]

[script]
src = "src/js/**/*.js"
dest = "dist/js"
# Syntax level scripts are lowered to
target = "es2015"

[server]
port = 3000
host = "127.0.0.1"
open = true
"#;

const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>kiln</title>
  <link rel="stylesheet" href="css/main.min.css">
</head>
<body>
  <main class="container">
    <h1 class="title">Hello from kiln</h1>
  </main>
  <script src="js/main.min.js"></script>
</body>
</html>
"#;

const DEFAULT_MAIN_SCSS: &str = r#"@import "variables";

.container {
  max-width: $container-width;
  margin: 0 auto;
}

.title {
  color: $primary;
  display: flex;
}
"#;

const DEFAULT_VARIABLES_SCSS: &str = r#"$primary: #3b5bdb;
$container-width: 960px;
"#;

const DEFAULT_MAIN_JS: &str = r#"document.addEventListener('DOMContentLoaded', function () {
  console.log('kiln ready');
});
"#;
