/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use super::error::Result;
use super::host::RootfsResolver;
use super::namespace::{NamespaceKind, NamespaceSet};
use super::pod::SecurityContext;
use super::selinux::{setup_selinux, LabelInitializer};
use super::validate::ValidatedPod;
use oci_spec::runtime::{
    Capabilities, Capability, LinuxBuilder, LinuxCapabilities,
    LinuxCapabilitiesBuilder, LinuxNamespace, LinuxNamespaceBuilder, Mount,
    MountBuilder, ProcessBuilder, RootBuilder, Spec, SpecBuilder, UserBuilder,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

pub const OCI_VERSION: &str = "1.0.2-dev";

// Every capability the kernel knows of, granted to privileged sandboxes.
const ALL_CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
    "CAP_PERFMON",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
];

/// Set/add primitives used to assemble an OCI runtime spec.
pub trait OciSpecBuilder {
    fn set_root_path(&mut self, path: PathBuf);
    fn set_root_readonly(&mut self, readonly: bool);
    fn set_hostname(&mut self, hostname: &str);
    fn add_mount(&mut self, mount: Mount);
    fn set_process_cwd(&mut self, cwd: PathBuf);
    fn set_process_args(&mut self, args: Vec<String>);
    fn add_or_replace_linux_namespace(
        &mut self,
        kind: NamespaceKind,
        path: Option<&Path>,
    );
    fn add_annotation(&mut self, key: &str, value: &str);
    fn add_linux_sysctl(&mut self, key: &str, value: &str);
    fn set_linux_cgroups_path(&mut self, path: PathBuf);
    fn set_linux_mount_label(&mut self, label: String);
    fn set_process_selinux_label(&mut self, label: String);
    fn setup_privileged(&mut self, privileged: bool);
    fn set_process_uid(&mut self, uid: u32);
    fn set_process_gid(&mut self, gid: u32);
    fn add_process_additional_gid(&mut self, gid: u32);
}

/// Collects spec fields and assembles them with the `oci_spec` builders.
///
/// Empty labels and an empty hostname are left out of the spec.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    root_path: PathBuf,
    root_readonly: bool,
    hostname: String,
    mounts: Vec<Mount>,
    cwd: PathBuf,
    args: Vec<String>,
    namespaces: NamespaceSet,
    annotations: HashMap<String, String>,
    sysctls: HashMap<String, String>,
    cgroups_path: Option<PathBuf>,
    mount_label: String,
    selinux_label: String,
    privileged: bool,
    uid: u32,
    gid: u32,
    additional_gids: Vec<u32>,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Result<Spec> {
        let Generator {
            root_path,
            root_readonly,
            hostname,
            mounts,
            cwd,
            args,
            namespaces,
            annotations,
            sysctls,
            cgroups_path,
            mount_label,
            selinux_label,
            privileged,
            uid,
            gid,
            additional_gids,
        } = self;

        let root = RootBuilder::default()
            .path(root_path)
            .readonly(root_readonly)
            .build()?;

        let user = UserBuilder::default()
            .uid(uid)
            .gid(gid)
            .additional_gids(additional_gids)
            .build()?;

        let mut process =
            ProcessBuilder::default().cwd(cwd).args(args).user(user);
        // Privileged sandboxes run unconfined.
        if privileged {
            process = process.capabilities(privileged_capabilities()?);
        } else if !selinux_label.is_empty() {
            process = process.selinux_label(selinux_label);
        }
        let process = process.build()?;

        let namespaces = namespaces
            .iter()
            .map(|(kind, path)| linux_namespace(kind, path))
            .collect::<Result<Vec<_>>>()?;

        let mut linux =
            LinuxBuilder::default().namespaces(namespaces).sysctl(sysctls);
        if !mount_label.is_empty() {
            linux = linux.mount_label(mount_label);
        }
        if let Some(cgroups_path) = cgroups_path {
            linux = linux.cgroups_path(cgroups_path);
        }
        let linux = linux.build()?;

        let mut spec = SpecBuilder::default()
            .version(OCI_VERSION)
            .root(root)
            .mounts(mounts)
            .process(process)
            .linux(linux)
            .annotations(annotations);
        if !hostname.is_empty() {
            spec = spec.hostname(hostname);
        }

        Ok(spec.build()?)
    }
}

impl OciSpecBuilder for Generator {
    fn set_root_path(&mut self, path: PathBuf) {
        self.root_path = path;
    }

    fn set_root_readonly(&mut self, readonly: bool) {
        self.root_readonly = readonly;
    }

    fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    fn add_mount(&mut self, mount: Mount) {
        self.mounts.push(mount);
    }

    fn set_process_cwd(&mut self, cwd: PathBuf) {
        self.cwd = cwd;
    }

    fn set_process_args(&mut self, args: Vec<String>) {
        self.args = args;
    }

    fn add_or_replace_linux_namespace(
        &mut self,
        kind: NamespaceKind,
        path: Option<&Path>,
    ) {
        let _ = self.namespaces.insert(kind, path.map(Path::to_path_buf));
    }

    fn add_annotation(&mut self, key: &str, value: &str) {
        let _ = self.annotations.insert(key.to_string(), value.to_string());
    }

    fn add_linux_sysctl(&mut self, key: &str, value: &str) {
        let _ = self.sysctls.insert(key.to_string(), value.to_string());
    }

    fn set_linux_cgroups_path(&mut self, path: PathBuf) {
        self.cgroups_path = Some(path);
    }

    fn set_linux_mount_label(&mut self, label: String) {
        self.mount_label = label;
    }

    fn set_process_selinux_label(&mut self, label: String) {
        self.selinux_label = label;
    }

    fn setup_privileged(&mut self, privileged: bool) {
        self.privileged = privileged;
    }

    fn set_process_uid(&mut self, uid: u32) {
        self.uid = uid;
    }

    fn set_process_gid(&mut self, gid: u32) {
        self.gid = gid;
    }

    fn add_process_additional_gid(&mut self, gid: u32) {
        if !self.additional_gids.contains(&gid) {
            self.additional_gids.push(gid);
        }
    }
}

fn linux_namespace(
    kind: NamespaceKind,
    path: Option<&Path>,
) -> Result<LinuxNamespace> {
    let builder = LinuxNamespaceBuilder::default().typ(kind);
    let builder = match path {
        Some(path) => builder.path(path),
        None => builder,
    };
    Ok(builder.build()?)
}

fn privileged_capabilities() -> Result<LinuxCapabilities> {
    let capabilities: Capabilities = ALL_CAPABILITIES
        .iter()
        .filter_map(|name| {
            match serde_json::from_value::<Capability>((*name).into()) {
                Ok(capability) => Some(capability),
                Err(e) => {
                    // Newer than the oci-spec schema we build against.
                    trace!("skipping capability {name}: {e}");
                    None
                }
            }
        })
        .collect();

    Ok(LinuxCapabilitiesBuilder::default()
        .bounding(capabilities.clone())
        .effective(capabilities.clone())
        .inheritable(capabilities.clone())
        .permitted(capabilities.clone())
        .ambient(capabilities)
        .build()?)
}

fn proc_mount() -> Result<Mount> {
    Ok(MountBuilder::default()
        .destination("/proc")
        .typ("proc")
        .source("proc")
        .build()?)
}

/// Translates validated pod sandboxes into OCI runtime specs.
#[derive(Debug)]
pub struct PodTranslator {
    rootfs: Box<dyn RootfsResolver>,
    labels: Box<dyn LabelInitializer>,
}

impl PodTranslator {
    pub fn new(
        rootfs: impl RootfsResolver + 'static,
        labels: impl LabelInitializer + 'static,
    ) -> Self {
        Self { rootfs: Box::new(rootfs), labels: Box::new(labels) }
    }

    pub fn translate(&self, pod: &ValidatedPod) -> Result<Spec> {
        let mut generator = Generator::new();
        self.populate(pod, &mut generator)?;
        generator.build()
    }

    /// Drives `builder` through every field the sandbox spec carries.
    pub fn populate(
        &self,
        pod: &ValidatedPod,
        builder: &mut dyn OciSpecBuilder,
    ) -> Result<()> {
        debug!("translating pod sandbox {} into an OCI spec", pod.id);

        builder.set_root_path(self.rootfs.rootfs_path(&pod.id));
        builder.set_root_readonly(false);

        builder.set_hostname(&pod.hostname);
        builder.add_mount(proc_mount()?);

        // TODO: nothing replaces this placeholder before the sandbox is
        // started, confirm the execution engine does not run it as is.
        builder.set_process_cwd(PathBuf::from("/"));
        builder.set_process_args(vec!["true".to_string()]);

        for (kind, path) in pod.namespaces.iter() {
            builder.add_or_replace_linux_namespace(kind, path);
        }
        builder.add_or_replace_linux_namespace(NamespaceKind::Mount, None);

        for (key, value) in &pod.annotations {
            builder.add_annotation(key, value);
        }
        for (key, value) in pod.sysctls() {
            builder.add_linux_sysctl(key, value);
        }

        builder.set_linux_cgroups_path(PathBuf::from(pod.cgroup_parent()));

        let security = pod.security_context();
        setup_selinux(
            builder,
            security.and_then(|security| security.selinux_options.as_ref()),
            self.labels.as_ref(),
        )?;

        let default_security = SecurityContext::default();
        let security = security.unwrap_or(&default_security);
        builder.setup_privileged(security.privileged);
        builder.set_root_readonly(security.readonly_rootfs);
        builder.set_process_uid(security.run_as_user.unwrap_or_default());
        builder.set_process_gid(security.run_as_group.unwrap_or_default());
        for gid in &security.supplemental_groups {
            builder.add_process_additional_gid(*gid);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::host::{BundleLayout, HostnameLookup};
    use crate::cri::pod::{LinuxPod, PodDescriptor, SeLinuxOptions};
    use crate::cri::selinux::{HostLabels, LabelError};
    use crate::cri::validate::PodValidator;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[derive(Debug)]
    struct FixedHostname;

    impl HostnameLookup for FixedHostname {
        fn hostname(&self) -> std::io::Result<String> {
            Ok("node-7".into())
        }
    }

    #[derive(Debug)]
    struct FixedLabels;

    impl LabelInitializer for FixedLabels {
        fn init_labels(
            &self,
            _options: &[String],
        ) -> std::result::Result<(String, String), LabelError> {
            Ok((
                "system_u:system_r:container_t:s0:c1,c2".into(),
                "system_u:object_r:container_file_t:s0:c1,c2".into(),
            ))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingBuilder {
        calls: Vec<String>,
        mounts: Vec<Mount>,
    }

    impl OciSpecBuilder for RecordingBuilder {
        fn set_root_path(&mut self, path: PathBuf) {
            self.calls.push(format!("root_path {}", path.display()));
        }
        fn set_root_readonly(&mut self, readonly: bool) {
            self.calls.push(format!("root_readonly {readonly}"));
        }
        fn set_hostname(&mut self, hostname: &str) {
            self.calls.push(format!("hostname {hostname}"));
        }
        fn add_mount(&mut self, mount: Mount) {
            self.mounts.push(mount);
        }
        fn set_process_cwd(&mut self, cwd: PathBuf) {
            self.calls.push(format!("cwd {}", cwd.display()));
        }
        fn set_process_args(&mut self, args: Vec<String>) {
            self.calls.push(format!("args {args:?}"));
        }
        fn add_or_replace_linux_namespace(
            &mut self,
            kind: NamespaceKind,
            path: Option<&Path>,
        ) {
            self.calls.push(format!("namespace {kind} {path:?}"));
        }
        fn add_annotation(&mut self, key: &str, value: &str) {
            self.calls.push(format!("annotation {key}={value}"));
        }
        fn add_linux_sysctl(&mut self, key: &str, value: &str) {
            self.calls.push(format!("sysctl {key}={value}"));
        }
        fn set_linux_cgroups_path(&mut self, path: PathBuf) {
            self.calls.push(format!("cgroups_path {}", path.display()));
        }
        fn set_linux_mount_label(&mut self, label: String) {
            self.calls.push(format!("mount_label {label}"));
        }
        fn set_process_selinux_label(&mut self, label: String) {
            self.calls.push(format!("selinux_label {label}"));
        }
        fn setup_privileged(&mut self, privileged: bool) {
            self.calls.push(format!("privileged {privileged}"));
        }
        fn set_process_uid(&mut self, uid: u32) {
            self.calls.push(format!("uid {uid}"));
        }
        fn set_process_gid(&mut self, gid: u32) {
            self.calls.push(format!("gid {gid}"));
        }
        fn add_process_additional_gid(&mut self, gid: u32) {
            self.calls.push(format!("additional_gid {gid}"));
        }
    }

    fn validate(pod: PodDescriptor) -> ValidatedPod {
        PodValidator::default()
            .with_hostname_lookup(FixedHostname)
            .validate(pod)
            .expect("valid pod")
    }

    fn translator() -> PodTranslator {
        PodTranslator::new(BundleLayout::new("/run/pods"), FixedLabels)
    }

    fn to_json(spec: &Spec) -> Value {
        serde_json::to_value(spec).expect("spec serializes")
    }

    fn secure_pod(id: &str) -> PodDescriptor {
        let mut pod = PodDescriptor::new(id);
        let _ = pod.namespaces.insert(NamespaceKind::Network, None);
        let _ = pod.namespaces.insert(
            NamespaceKind::Ipc,
            Some(PathBuf::from("/proc/42/ns/ipc")),
        );
        let _ = pod.annotations.insert("team".into(), "storage".into());
        pod.linux = Some(LinuxPod {
            sysctls: [("net.ipv4.ip_forward".to_string(), "1".to_string())]
                .into_iter()
                .collect(),
            security_context: Some(SecurityContext {
                readonly_rootfs: true,
                run_as_user: Some(1000),
                run_as_group: Some(2000),
                supplemental_groups: vec![10, 20, 10],
                selinux_options: Some(SeLinuxOptions {
                    user: "system_u".into(),
                    level: "s0:c1,c2".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        pod
    }

    #[test]
    fn populate_drives_builder_in_order() {
        let pod = validate(secure_pod("abc123"));
        let mut builder = RecordingBuilder::default();
        translator().populate(&pod, &mut builder).expect("populate");

        assert_eq!(
            builder.calls,
            vec![
                "root_path /run/pods/abc123/rootfs",
                "root_readonly false",
                "hostname node-7",
                "cwd /",
                "args [\"true\"]",
                "namespace ipc Some(\"/proc/42/ns/ipc\")",
                "namespace network None",
                "namespace mount None",
                "annotation team=storage",
                "sysctl net.ipv4.ip_forward=1",
                "cgroups_path singularity-cri/abc123",
                "mount_label system_u:object_r:container_file_t:s0:c1,c2",
                "selinux_label system_u:system_r:container_t:s0:c1,c2",
                "privileged false",
                "root_readonly true",
                "uid 1000",
                "gid 2000",
                "additional_gid 10",
                "additional_gid 20",
                "additional_gid 10",
            ]
        );
        assert_eq!(builder.mounts, vec![proc_mount().expect("mount")]);
    }

    #[test]
    fn translate_secure_pod() {
        let pod = validate(secure_pod("abc123"));
        let spec = to_json(&translator().translate(&pod).expect("spec"));

        assert_eq!(spec["ociVersion"], json!(OCI_VERSION));
        assert_eq!(
            spec["root"],
            json!({"path": "/run/pods/abc123/rootfs", "readonly": true})
        );
        assert_eq!(spec["hostname"], json!("node-7"));
        assert_eq!(
            spec["mounts"],
            json!([{"destination": "/proc", "type": "proc", "source": "proc"}])
        );
        assert_eq!(spec["process"]["cwd"], json!("/"));
        assert_eq!(spec["process"]["args"], json!(["true"]));
        assert_eq!(
            spec["process"]["user"],
            json!({"uid": 1000, "gid": 2000, "additionalGids": [10, 20]})
        );
        assert_eq!(
            spec["process"]["selinuxLabel"],
            json!("system_u:system_r:container_t:s0:c1,c2")
        );
        assert_eq!(
            spec["linux"]["mountLabel"],
            json!("system_u:object_r:container_file_t:s0:c1,c2")
        );
        assert_eq!(
            spec["linux"]["namespaces"],
            json!([
                {"type": "ipc", "path": "/proc/42/ns/ipc"},
                {"type": "network"},
                {"type": "mount"},
            ])
        );
        assert_eq!(
            spec["linux"]["sysctl"],
            json!({"net.ipv4.ip_forward": "1"})
        );
        assert_eq!(spec["linux"]["cgroupsPath"], json!("singularity-cri/abc123"));
        assert_eq!(spec["annotations"], json!({"team": "storage"}));
    }

    #[test]
    fn translate_without_security_context() {
        let pod = validate(PodDescriptor::new("abc123"));
        let spec = to_json(&translator().translate(&pod).expect("spec"));

        assert_eq!(spec["root"]["readonly"], json!(false));
        assert_eq!(spec["process"]["user"]["uid"], json!(0));
        assert_eq!(spec["process"]["user"]["gid"], json!(0));
        assert_eq!(spec["process"].get("selinuxLabel"), None);
        assert_eq!(spec["linux"].get("mountLabel"), None);
        assert_eq!(spec["linux"]["namespaces"], json!([{"type": "mount"}]));
    }

    #[test]
    fn mount_namespace_is_never_duplicated() {
        let mut pod = PodDescriptor::new("abc123");
        let _ = pod.namespaces.insert(
            NamespaceKind::Mount,
            Some(PathBuf::from("/proc/1/ns/mnt")),
        );
        let pod = validate(pod);

        let spec = to_json(&translator().translate(&pod).expect("spec"));
        let namespaces = spec["linux"]["namespaces"]
            .as_array()
            .expect("namespace list");
        let mounts = spec["mounts"].as_array().expect("mount list");

        assert_eq!(namespaces, &vec![json!({"type": "mount"})]);
        assert_eq!(
            mounts.iter().filter(|m| m["destination"] == "/proc").count(),
            1
        );
    }

    #[test]
    fn privileged_pod_is_unconfined() {
        let mut pod = secure_pod("abc123");
        if let Some(security) =
            pod.linux.as_mut().and_then(|l| l.security_context.as_mut())
        {
            security.privileged = true;
        }
        let pod = validate(pod);

        let spec = to_json(&translator().translate(&pod).expect("spec"));
        let bounding = spec["process"]["capabilities"]["bounding"]
            .as_array()
            .expect("bounding set");

        assert!(bounding.contains(&json!("CAP_SYS_ADMIN")));
        assert!(bounding.contains(&json!("CAP_NET_ADMIN")));
        assert_eq!(
            spec["process"]["capabilities"]["ambient"]
                .as_array()
                .map(Vec::len),
            Some(bounding.len())
        );
        assert_eq!(spec["process"].get("selinuxLabel"), None);
        assert_eq!(spec["linux"].get("seccomp"), None);
    }

    #[test]
    fn translation_depends_on_id_only_through_paths() {
        let first = to_json(
            &translator()
                .translate(&validate(secure_pod("abc123")))
                .expect("spec"),
        );
        let mut second = to_json(
            &translator()
                .translate(&validate(secure_pod("def456")))
                .expect("spec"),
        );

        assert_eq!(
            second["root"]["path"],
            json!("/run/pods/def456/rootfs")
        );
        second["root"]["path"] = first["root"]["path"].clone();
        second["linux"]["cgroupsPath"] = first["linux"]["cgroupsPath"].clone();

        // Capability sets serialize in hash order.
        let mut first = first;
        for spec in [&mut first, &mut second] {
            let _ = spec["process"]
                .as_object_mut()
                .and_then(|process| process.remove("capabilities"));
        }
        assert_eq!(first, second);
    }

    #[test]
    fn translate_with_disabled_host_selinux() {
        let translator =
            PodTranslator::new(BundleLayout::default(), HostLabels::new(false));
        let pod = validate(secure_pod("abc123"));

        let spec = to_json(&translator.translate(&pod).expect("spec"));
        assert_eq!(spec["process"].get("selinuxLabel"), None);
        assert_eq!(spec["linux"].get("mountLabel"), None);
    }
}
