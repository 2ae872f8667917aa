//! Slate CLI — command-line driver for the Slate compiler.
//!
//! `slatec <file.src>` compiles a source file to a native executable;
//! `slatec init [<name>]` scaffolds a project. Any parse, resolve,
//! lowering, or link failure prints the first error and exits non-zero.

mod manifest;

use clap::{Parser as ClapParser, Subcommand};
use slate_codegen::{emit_object, lower_program, CodegenContext};
use slate_compiler::compiler::types::TypeRegistry;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

#[derive(ClapParser)]
#[command(
    name = "slatec",
    version,
    about = "The Slate programming language compiler",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Source file to compile (`.src`)
    file: Option<PathBuf>,

    /// Print the AST and IR, then compile
    #[arg(long)]
    debug: bool,

    /// Print the AST and IR without compiling
    #[arg(long = "ast", alias = "parse-only")]
    ast_only: bool,

    /// Output executable name
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Positional output name (kept for backward compatibility)
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new Slate project
    Init {
        /// Project directory (defaults to the current directory)
        name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Some(Commands::Init { name }) => init_project(name.as_deref().unwrap_or(".")),
        None => match &cli.file {
            Some(file) => compile_file(file, cli.debug, cli.ast_only, cli.output.or(cli.out)),
            None => {
                eprintln!("error: no input file; try 'slatec <file.src>' or 'slatec init'");
                2
            }
        },
    };
    exit(code);
}

/// Output path when none is given: the input with `.src` stripped.
fn default_output_name(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|e| e == "src") {
        input.with_extension("")
    } else {
        input.with_extension("out")
    }
}

fn compile_file(input: &Path, debug: bool, ast_only: bool, output: Option<PathBuf>) -> i32 {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not open file {}: {e}", input.display());
            return 1;
        }
    };

    if debug || ast_only {
        println!("Parsing file: {}", input.display());
        println!("Content:\n{source}");
        println!("---");
    }

    let mut registry = TypeRegistry::new();
    let program = match slate_compiler::compile_source(&source, &mut registry) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let base_dir = match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    manifest::warn_unlisted_externals(&program, &base_dir);

    if debug || ast_only {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("AST:\n{json}\n"),
            Err(e) => eprintln!("warning: failed to render AST: {e}"),
        }
    }

    let context = match CodegenContext::new() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    let lowered = match lower_program(context, &program, &mut registry, &base_dir, debug || ast_only)
    {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    if debug || ast_only {
        println!("IR:");
        for func in &lowered.ir {
            println!("{func}");
        }
    }
    if ast_only {
        println!("Parse completed successfully (no executable generated)");
        return 0;
    }

    let output = output.unwrap_or_else(|| default_output_name(input));
    let object_path = output.with_extension("o");
    let bytes = match emit_object(lowered.module) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    if let Err(e) = std::fs::write(&object_path, &bytes) {
        eprintln!("error: could not write {}: {e}", object_path.display());
        return 1;
    }

    // Link with the host C toolchain; the builtin shims resolve against libc.
    let status = Command::new("cc")
        .arg("-no-pie")
        .arg(&object_path)
        .arg("-o")
        .arg(&output)
        .status();
    std::fs::remove_file(&object_path).ok();

    match status {
        Ok(s) if s.success() => {
            if debug {
                println!("Successfully generated executable: {}", output.display());
            }
            0
        }
        Ok(s) => {
            eprintln!("error: linker exited with {s}");
            1
        }
        Err(e) => {
            eprintln!("error: failed to run linker: {e}");
            1
        }
    }
}

fn init_project(name: &str) -> i32 {
    let root = if name == "." {
        PathBuf::from(".")
    } else {
        let p = PathBuf::from(name);
        if let Err(e) = std::fs::create_dir_all(&p) {
            eprintln!("error: could not create project directory '{name}': {e}");
            return 1;
        }
        p
    };

    if let Err(e) = std::fs::create_dir_all(root.join("includes")) {
        eprintln!("error: could not create includes directory: {e}");
        return 1;
    }

    let main_src = "import \"@std\"\n\n\
                    def main() -> i32 {\n    \
                    std.println(\"Hello, Slate!\");\n    \
                    return 0;\n\
                    }\n";
    if let Err(e) = std::fs::write(root.join("main.src"), main_src) {
        eprintln!("error: could not create main.src: {e}");
        return 1;
    }

    let project_name = if name == "." { "slate_project" } else { name };
    let manifest = format!(
        "[project]\n\
         name = \"{project_name}\"\n\
         version = \"0.1.0\"\n\
         author = \"Your Name\"\n\n\
         [dependencies]\n\
         # Add your dependencies here\n\
         # example_lib = {{ version = \"1.0.0\", url = \"github.com/user/example_lib\" }}\n"
    );
    if let Err(e) = std::fs::write(root.join("project.toml"), manifest) {
        eprintln!("error: could not create project.toml: {e}");
        return 1;
    }

    println!("Successfully initialized Slate project!");
    println!("Created:");
    println!("  - main.src");
    println!("  - project.toml");
    println!("  - includes/");
    println!();
    println!("To compile and run:");
    println!("  slatec main.src && ./main");
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_strips_src_extension() {
        assert_eq!(
            default_output_name(Path::new("examples/app.src")),
            PathBuf::from("examples/app")
        );
    }

    #[test]
    fn output_name_without_src_gets_out_suffix() {
        assert_eq!(
            default_output_name(Path::new("app")),
            PathBuf::from("app.out")
        );
    }

    #[test]
    fn init_scaffolds_a_project() {
        let dir = std::env::temp_dir().join(format!("slate-init-test-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let name = dir.to_str().expect("temp path is valid UTF-8");
        assert_eq!(init_project(name), 0);
        assert!(dir.join("main.src").is_file());
        assert!(dir.join("project.toml").is_file());
        assert!(dir.join("includes").is_dir());

        // The scaffolded program must be accepted by the front end.
        let source = std::fs::read_to_string(dir.join("main.src")).unwrap();
        let mut registry = TypeRegistry::new();
        assert!(slate_compiler::compile_source(&source, &mut registry).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
