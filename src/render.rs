use std::collections::BTreeMap;

use crate::model::resolved::{ArtifactKind, ResolvedPackage};

/// Static part of the generated `packages.bzl`. The `{workspace_name}` and
/// `{deps}` placeholders are Starlark-side: `render_package_build` fills them
/// in at loading time.
const HEADER: &str = r#"# Generated by wheelfetch
# DO NOT EDIT!

load("@bazel_tools//tools/build_defs/repo:http.bzl", "http_archive")
load("@wheelfetch//:defs.bzl", "pip_install_sdist")

BUILD_TEMPLATE = '''
package(default_visibility = ["//visibility:public"])

load("@rules_python//python:defs.bzl", "py_library")

py_library(
    name = "{workspace_name}",
    srcs = glob(["**/*.py"], allow_empty = True),
    data = glob(["**/*"], exclude=["**/*.py", "**/* *", "BUILD", "WORKSPACE"]),
    # This makes this directory a top-level in the python import search path
    # for anything that depends on this.
    imports = ["."],
    deps = [{deps}],
)
'''

def render_package_build(name, deps):
    return BUILD_TEMPLATE.format(
        workspace_name=name,
        deps=",".join(["\"{}\"".format(dep) for dep in deps])
    )

def pypi(name):
    name_key = name.lower()
    if name_key not in packages:
        fail("Could not find poetry dependency: '%s'" % name)
    return packages[name_key]

"#;

/// Renders the whole `packages.bzl` into memory. Nothing touches the
/// filesystem here, so an aborted run never leaves a partial output file.
pub fn packages_bzl(packages: &[ResolvedPackage], labels: &BTreeMap<String, String>) -> String {
    let mut out = String::from(HEADER);

    out.push_str("def python_deps():\n");
    if packages.is_empty() {
        out.push_str("    pass\n");
    }
    for package in packages {
        out.push_str(&render_rule(package));
    }
    out.push('\n');

    out.push_str("packages = {\n");
    for (name, label) in labels {
        out.push_str(&format!("  \"{name}\": \"{label}\",\n"));
    }
    out.push_str("}\n");
    out.push_str("all_requirements = packages.values()\n");

    out
}

/// The `requirements.bzl` shim re-exporting the by-name lookup.
pub fn requirements_bzl(root_workspace: &str) -> String {
    format!(
        "load(\"@{root_workspace}//:packages.bzl\", \"pypi\")\n\
         def requirement(name): return pypi(name)\n"
    )
}

fn render_rule(package: &ResolvedPackage) -> String {
    let deps = package
        .dependencies
        .iter()
        .map(|dep| format!("pypi(\"{dep}\")"))
        .collect::<Vec<_>>()
        .join(",");
    let build_file_content = format!(
        "render_package_build(name=\"{}\", deps=[{}])",
        package.label, deps
    );

    let artifact = &package.artifact;
    match artifact.kind {
        ArtifactKind::Wheel => format!(
            r#"
    http_archive(
        name = "{name}",
        build_file_content = {build_file_content},
        sha256 = "{sha256}",
        type = "zip",
        urls = [
            "{url}",
        ],
    )
"#,
            name = package.label,
            build_file_content = build_file_content,
            sha256 = artifact.sha256,
            url = artifact.url,
        ),
        // Build-time dependencies of an sdist are not knowable from the lock
        // file; the sdist rule installs with whatever the build backend asks.
        ArtifactKind::Source => format!(
            r#"
    pip_install_sdist(
        name = "{name}",
        build_file_content = {build_file_content},
        sha256 = "{sha256}",
        url = "{url}",
    )
"#,
            name = package.label,
            build_file_content = build_file_content,
            sha256 = artifact.sha256,
            url = artifact.url,
        ),
    }
}
