use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use serde_json::{json, Value};

use arbor_codec::{decode, encode, shape_type};
use arbor_namespace::PollingFeed;
use arbor_server::response::{acl_json, domain_json, link_json};
use arbor_server::{DomainService, Identity, MaintenanceHandle, ServiceConfig};
use arbor_store::{
    is_container, Acl, FileContainer, LinkTarget, ObjectStore, OpenMode, Permission, Sidecar,
};
use arbor_types::UserId;

use crate::cli::*;

struct Session {
    service: DomainService,
    format: OutputFormat,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::from_env()?,
    };
    let ctx = Session {
        service: DomainService::from_config(config)?,
        format: cli.format,
    };
    match cli.command {
        Command::Toc(cmd) => cmd_toc(&ctx, cmd),
        Command::Domain(cmd) => cmd_domain(&ctx, cmd),
        Command::Ls(args) => cmd_ls(&ctx, args),
        Command::Acl(cmd) => cmd_acl(&ctx, cmd),
        Command::Import(args) => cmd_import(&ctx, args),
        Command::Reindex(args) => cmd_reindex(&ctx, args),
        Command::Type(TypeCommand::Check { json }) => cmd_type_check(&ctx, &json),
        Command::Watch => cmd_watch(&ctx),
    }
}

fn emit(ctx: &Session, body: &Value, text: impl FnOnce()) -> anyhow::Result<()> {
    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(body)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

/// Open a domain's container directly, bypassing ACL checks.
fn open_store(ctx: &Session, domain: &str) -> anyhow::Result<ObjectStore> {
    let mapper = ctx.service.mapper();
    let path = mapper.domain_to_path(domain)?;
    if mapper.is_toc_path(&path) {
        match mapper.home_user(domain)? {
            Some(user) => ctx.service.toc().ensure_user_toc(&user)?,
            None => ctx.service.toc().ensure_shared_toc()?,
        };
    }
    let container = FileContainer::open(&path, OpenMode::Auto)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut store = ObjectStore::open(Box::new(container), ctx.service.config().store.clone())?;
    if !store.is_read_only() {
        store.flush()?;
    }
    Ok(store)
}

fn user_id(ctx: &Session, name: &str) -> anyhow::Result<UserId> {
    if name == "default" {
        return Ok(UserId::DEFAULT);
    }
    ctx.service
        .mapper()
        .users()
        .lookup(name)
        .map(|r| r.id)
        .ok_or_else(|| anyhow!("unknown user {name:?}"))
}

fn parse_permissions(list: &str) -> anyhow::Result<Vec<Permission>> {
    if list.trim().eq_ignore_ascii_case("all") {
        return Ok(Permission::ALL.to_vec());
    }
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Permission::parse(s).ok_or_else(|| anyhow!("unknown permission {s:?}")))
        .collect()
}

fn apply_changes(mut acl: Acl, grant: &[Permission], revoke: &[Permission]) -> Acl {
    for p in grant {
        acl.set(*p, true);
    }
    for p in revoke {
        acl.set(*p, false);
    }
    acl
}

fn flags(acl: &Acl) -> String {
    Permission::ALL
        .iter()
        .map(|p| {
            if acl.allows(*p) {
                p.as_str().green().to_string()
            } else {
                p.as_str().dimmed().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---- toc ----

fn cmd_toc(ctx: &Session, cmd: TocCommand) -> anyhow::Result<()> {
    let toc = ctx.service.toc();
    match cmd {
        TocCommand::Build { dir } => {
            let dir = dir.unwrap_or_else(|| ctx.service.config().namespace.data_root.clone());
            let summary = toc.create_toc_file(&dir)?;
            let body = json!({
                "path": summary.path.display().to_string(),
                "entries": summary.entries,
                "groups": summary.groups,
                "skipped": summary.skipped,
            });
            emit(ctx, &body, || {
                println!("{} Created {}", "✓".green().bold(), summary.path.display().to_string().bold());
                println!("  Entries: {}", summary.entries);
                println!("  Groups:  {}", summary.groups);
                if summary.skipped > 0 {
                    println!("  Skipped: {}", summary.skipped.to_string().yellow());
                }
            })
        }
        TocCommand::Update { path } => {
            let (action, changed) = if path.exists() {
                ("added", toc.add_entry(&path)?)
            } else {
                ("removed", toc.remove_entry(&path)?)
            };
            let body = json!({ "path": path.display().to_string(), "action": action, "changed": changed });
            emit(ctx, &body, || {
                if changed {
                    println!("{} Entry {} for {}", "✓".green(), action, path.display());
                } else {
                    println!("No change for {}", path.display());
                }
            })
        }
    }
}

// ---- domains ----

fn cmd_domain(ctx: &Session, cmd: DomainCommand) -> anyhow::Result<()> {
    let mapper = ctx.service.mapper();
    match cmd {
        DomainCommand::Path { domain } => {
            let path = mapper.domain_to_path(&domain)?;
            emit(ctx, &json!({ "domain": domain, "path": path.display().to_string() }), || {
                println!("{}", path.display())
            })
        }
        DomainCommand::Name { path } => {
            let domain = mapper.path_to_domain(&path)?;
            emit(ctx, &json!({ "domain": domain, "path": path.display().to_string() }), || {
                println!("{domain}")
            })
        }
        DomainCommand::Create { domain, owner } => {
            let identity = match owner {
                Some(name) => Identity::user(name.clone(), user_id(ctx, &name)?),
                None => Identity::anonymous(),
            };
            let info = ctx.service.create_domain(&domain, &identity)?;
            emit(ctx, &domain_json(&info), || {
                println!("{} Created domain {}", "✓".green().bold(), domain.bold());
                println!("  Root: {}", info.root.to_string().cyan());
            })
        }
        DomainCommand::Delete { domain, user } => {
            let identity = Identity::user(user.clone(), user_id(ctx, &user)?);
            ctx.service.delete_domain(&domain, &identity)?;
            emit(ctx, &json!({ "domain": domain, "deleted": true }), || {
                println!("{} Deleted domain {}", "✓".green().bold(), domain.bold())
            })
        }
    }
}

fn cmd_ls(ctx: &Session, args: LsArgs) -> anyhow::Result<()> {
    let store = open_store(ctx, &args.domain)?;
    let group = store.resolve_path(&args.h5path)?;
    let links = store.list_links(&group, None, None)?;
    let body = Value::Array(links.iter().map(link_json).collect());
    emit(ctx, &body, || {
        for link in &links {
            let target = match &link.target {
                LinkTarget::Hard { id, kind } => format!("{} {}", kind.collection(), id.short_id()),
                LinkTarget::Soft { path } => format!("-> {path}"),
                LinkTarget::External { domain, path } => format!("=> {domain}{path}"),
            };
            println!("{:<24} {}", link.name.bold(), target.cyan());
        }
        if links.is_empty() {
            println!("{}", "(empty)".dimmed());
        }
    })
}

// ---- access control ----

fn cmd_acl(ctx: &Session, cmd: AclCommand) -> anyhow::Result<()> {
    match cmd {
        AclCommand::Get { domain, user, path } => {
            let store = open_store(ctx, &domain)?;
            let id = store.resolve_path(&path)?;
            match user {
                Some(name) => {
                    let effective = store.get_acl(&id, user_id(ctx, &name)?)?;
                    let mut body = acl_json(&effective.acl);
                    body["source"] = json!(format!("{:?}", effective.source));
                    emit(ctx, &body, || {
                        println!("{} {}", name.bold(), flags(&effective.acl));
                        println!("  from {:?}", effective.source);
                    })
                }
                None => {
                    let acls = store.acls(&id)?;
                    let body = Value::Array(acls.iter().map(acl_json).collect());
                    emit(ctx, &body, || {
                        for acl in &acls {
                            let who = if acl.userid.is_default() {
                                "default".to_string()
                            } else {
                                ctx.service
                                    .mapper()
                                    .users()
                                    .name_of(acl.userid)
                                    .unwrap_or_else(|| acl.userid.to_string())
                            };
                            println!("{:<12} {}", who.bold(), flags(acl));
                        }
                    })
                }
            }
        }
        AclCommand::Set { domain, user, grant, revoke, path } => {
            let grant = parse_permissions(grant.as_deref().unwrap_or(""))?;
            let revoke = parse_permissions(revoke.as_deref().unwrap_or(""))?;
            if grant.is_empty() && revoke.is_empty() {
                bail!("nothing to change: pass --grant or --revoke");
            }
            let uid = user_id(ctx, &user)?;
            let mut store = open_store(ctx, &domain)?;
            let id = store.resolve_path(&path)?;
            let current = store
                .acls(&id)?
                .into_iter()
                .find(|a| a.userid == uid)
                .unwrap_or_else(|| Acl::deny_all(uid));
            let updated = apply_changes(current, &grant, &revoke);
            store.set_acl(&id, updated)?;
            store.close()?;
            emit(ctx, &acl_json(&updated), || {
                println!("{} {} {}", "✓".green(), user.bold(), flags(&updated))
            })
        }
    }
}

// ---- maintenance ----

fn cmd_import(ctx: &Session, args: ImportArgs) -> anyhow::Result<()> {
    if !is_container(&args.file) {
        bail!("{} is not a valid container", args.file.display());
    }
    let target = ctx.service.mapper().domain_to_path(&args.domain)?;
    if ctx.service.mapper().is_toc_path(&target) {
        bail!("{} is a table of contents", args.domain);
    }
    if target.exists() {
        bail!("{} already exists", target.display());
    }
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::copy(&args.file, &target)
        .with_context(|| format!("copying {} to {}", args.file.display(), target.display()))?;
    let listed = ctx.service.toc().add_entry(&target)?;
    let body = json!({ "domain": args.domain, "path": target.display().to_string(), "listed": listed });
    emit(ctx, &body, || {
        println!("{} Imported {} as {}", "✓".green().bold(), args.file.display(), args.domain.bold());
        if !listed {
            println!("  {}", "not added to the table of contents".yellow());
        }
    })
}

fn reindex(file: &Path, ctx: &Session) -> anyhow::Result<(Sidecar, usize)> {
    let sidecar = Sidecar::for_container(file, &ctx.service.config().store.sidecar_ext);
    sidecar.remove()?;
    let container = FileContainer::open(file, OpenMode::ReadOnly)?;
    let store = ObjectStore::open(Box::new(container), ctx.service.config().store.clone())?;
    let counts = store.counts();
    Ok((sidecar, counts.groups + counts.datasets + counts.datatypes))
}

fn cmd_reindex(ctx: &Session, args: ReindexArgs) -> anyhow::Result<()> {
    let (sidecar, objects) = reindex(&args.file, ctx)?;
    let body = json!({ "sidecar": sidecar.path().display().to_string(), "objects": objects });
    emit(ctx, &body, || {
        println!("{} Indexed {} objects into {}", "✓".green().bold(), objects, sidecar.path().display())
    })
}

fn cmd_type_check(ctx: &Session, text: &str) -> anyhow::Result<()> {
    let wire: Value = serde_json::from_str(text).context("schema is not valid JSON")?;
    let ty = decode(&wire)?;
    let body = json!({ "shaped": shape_type(&ty), "wire": encode(&ty) });
    emit(ctx, &body, || {
        println!("{} {}", "✓".green().bold(), ty.class_name().bold());
        println!("{}", shape_type(&ty));
    })
}

fn cmd_watch(ctx: &Session) -> anyhow::Result<()> {
    let config = ctx.service.config().clone();
    let toc = Arc::clone(ctx.service.toc());
    let runtime = tokio::runtime::Runtime::new()?;
    let changed = runtime.block_on(async move {
        toc.ensure_shared_toc()?;
        let mut feed = PollingFeed::new(&config.namespace);
        let known = feed.prime().await?;
        println!(
            "Watching {} ({} containers), Ctrl-C to stop",
            config.namespace.data_root.display().to_string().bold(),
            known
        );
        let handle = MaintenanceHandle::spawn(toc, Box::new(feed), config.watch.clone());
        tokio::signal::ctrl_c().await?;
        anyhow::Ok(handle.shutdown().await?)
    })?;
    println!("{} {} TOC entries updated", "✓".green().bold(), changed);
    Ok(())
}
