//! Finding, executing and caching modules.
//!
//! A top-level module `name` is looked up as `name/__init__.<ext>` (a package)
//! or `name.<ext>` in the root directory (the working directory unless
//! configured), then in each search path, and finally among the native
//! modules. Submodules of a package are looked up in the package directory only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::engine::Runtime;
use crate::errors::{EvalError, Result};
use crate::functions::math;
use crate::grammar::parse_program;
use crate::interpreter;
use crate::value::{Module, Value};

/// Environment variable holding extra module directories, in the platform's path-list format.
pub const SEARCH_PATH_ENV: &str = "LATEBOUND_PATH";

const PACKAGE_INIT: &str = "__init__";

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// First directory searched. `None` means the process working directory at lookup time.
    pub root: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    /// Source file extension, without the dot.
    pub extension: String,
    pub native_modules: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            root: None,
            search_paths: Vec::new(),
            extension: "py".to_string(),
            native_modules: true,
        }
    }
}

impl LoaderOptions {
    /// Defaults plus the directories listed in `LATEBOUND_PATH`.
    pub fn from_env() -> Self {
        let search_paths = std::env::var_os(SEARCH_PATH_ENV)
            .map(|raw| {
                std::env::split_paths(&raw)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            search_paths,
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn without_native_modules(mut self) -> Self {
        self.native_modules = false;
        self
    }

    fn directories(&self) -> Vec<PathBuf> {
        let root = self.root.clone().or_else(|| std::env::current_dir().ok());
        root.into_iter().chain(self.search_paths.iter().cloned()).collect()
    }
}

struct Located {
    file: PathBuf,
    package_dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct Loader {
    options: Arc<LoaderOptions>,
    cache: Arc<RwLock<HashMap<String, Arc<Module>>>>,
}

impl Loader {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options: Arc::new(options),
            cache: Arc::default(),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// A module already loaded under its fully qualified name.
    pub fn cached(&self, qualified: &str) -> Option<Arc<Module>> {
        self.cache.read().get(qualified).cloned()
    }

    fn locate_in(&self, dir: &Path, name: &str) -> Option<Located> {
        let ext = &self.options.extension;
        let package_dir = dir.join(name);
        let init = package_dir.join(format!("{PACKAGE_INIT}.{ext}"));
        if init.is_file() {
            return Some(Located {
                file: init,
                package_dir: Some(package_dir),
            });
        }
        let file = dir.join(format!("{name}.{ext}"));
        file.is_file().then_some(Located {
            file,
            package_dir: None,
        })
    }

    /// Loads the top-level module `name`, or `Ok(None)` when no source or native module exists.
    pub fn load(&self, runtime: &Runtime, name: &str) -> Result<Option<Arc<Module>>> {
        if let Some(module) = self.cached(name) {
            return Ok(Some(module));
        }
        let located = self
            .options
            .directories()
            .iter()
            .find_map(|dir| self.locate_in(dir, name));
        if let Some(located) = located {
            return self.execute(runtime, name, located).map(Some);
        }
        if self.options.native_modules && name == math::NAME {
            debug!(module = name, "loading native module");
            let module = math::module();
            self.cache.write().insert(name.to_string(), module.clone());
            return Ok(Some(module));
        }
        Ok(None)
    }

    /// Loads `parent.child` from the parent's package directory and binds it
    /// as an attribute of the parent.
    pub fn load_submodule(
        &self,
        runtime: &Runtime,
        parent: &Module,
        child: &str,
    ) -> Result<Option<Arc<Module>>> {
        let qualified = format!("{}.{child}", parent.name());
        if let Some(module) = self.cached(&qualified) {
            return Ok(Some(module));
        }
        let Some(located) = parent
            .package_dir()
            .and_then(|dir| self.locate_in(dir, child))
        else {
            return Ok(None);
        };
        let module = self.execute(runtime, &qualified, located)?;
        parent
            .namespace()
            .set(child, Value::Module(module.clone()));
        Ok(Some(module))
    }

    fn execute(&self, runtime: &Runtime, qualified: &str, located: Located) -> Result<Arc<Module>> {
        debug!(module = qualified, file = %located.file.display(), "loading module");
        let source = std::fs::read_to_string(&located.file).map_err(|source| EvalError::Io {
            path: located.file.clone(),
            source,
        })?;
        let program = parse_program(&source)
            .map_err(|e| EvalError::Parse(format!("{}: {e}", located.file.display())))?;

        let module = Arc::new(Module::from_file(
            qualified,
            located.file.clone(),
            located.package_dir,
        ));
        // Cached before running so circular imports see the partial module.
        self.cache
            .write()
            .insert(qualified.to_string(), module.clone());

        if let Err(e) = interpreter::run(runtime, &program, module.namespace()) {
            self.cache.write().remove(qualified);
            warn!(module = qualified, error = %e, "module failed to execute");
            return Err(e);
        }
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("latebound-loader-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn options_builder() {
        let opts = LoaderOptions::default()
            .with_root("/tmp/root")
            .with_search_path("/tmp/extra")
            .with_extension(".lb");
        assert_eq!(opts.extension, "lb");
        assert_eq!(
            opts.directories(),
            vec![PathBuf::from("/tmp/root"), PathBuf::from("/tmp/extra")]
        );
    }

    #[test]
    fn loads_and_caches_file_modules() {
        let dir = scratch("cache");
        std::fs::write(dir.join("settings.py"), "limit = 3\n").unwrap();
        let runtime = Runtime::new(LoaderOptions::default().with_root(&dir));
        let loader = runtime.loader();

        let first = loader.load(&runtime, "settings").unwrap().unwrap();
        assert_eq!(first.namespace().get("limit"), Some(Value::Int(3)));
        let second = loader.load(&runtime, "settings").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.load(&runtime, "absent").unwrap().is_none());
    }

    #[test]
    fn search_paths_come_after_root() {
        let root = scratch("root");
        let extra = scratch("extra");
        std::fs::write(root.join("shared.py"), "origin = 'root'\n").unwrap();
        std::fs::write(extra.join("shared.py"), "origin = 'extra'\n").unwrap();
        std::fs::write(extra.join("only_extra.py"), "origin = 'extra'\n").unwrap();
        let runtime = Runtime::new(LoaderOptions::default().with_root(&root).with_search_path(&extra));
        let loader = runtime.loader();

        let shared = loader.load(&runtime, "shared").unwrap().unwrap();
        assert_eq!(shared.namespace().get("origin"), Some(Value::from("root")));
        let only = loader.load(&runtime, "only_extra").unwrap().unwrap();
        assert_eq!(only.namespace().get("origin"), Some(Value::from("extra")));
    }

    #[test]
    fn failing_module_is_not_cached() {
        let dir = scratch("failing");
        std::fs::write(dir.join("broken.py"), "x = 1 / 0\n").unwrap();
        let runtime = Runtime::new(LoaderOptions::default().with_root(&dir));
        let loader = runtime.loader();
        assert!(loader.load(&runtime, "broken").is_err());
        assert!(loader.cached("broken").is_none());
    }

    #[test]
    fn native_modules_can_be_disabled() {
        let dir = scratch("native");
        let with = Runtime::new(LoaderOptions::default().with_root(&dir));
        assert!(with.loader().load(&with, "math").unwrap().is_some());
        let without = Runtime::new(LoaderOptions::default().with_root(&dir).without_native_modules());
        assert!(without.loader().load(&without, "math").unwrap().is_none());
    }
}
