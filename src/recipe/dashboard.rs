//! OpenStack dashboard (Horizon) on Red Hat hosts
//!
//! Installs the dashboard and the python database bindings for the
//! configured database, renders `local_settings` and the Apache virtual
//! host, deploys the TLS certificate and key, and keeps SELinux labels in
//! line with the files it writes.

use anyhow::{Context, Result, bail};
use declarative::{
    Action, CommandSpec, ExecutionPlan, PackageSpec, Resource, ResourceId, Timing,
};
use serde_json::{Value, json};

use super::RecipeContext;

pub const SET_SELINUX_PERMISSIVE: &str = "set-selinux-permissive";
pub const SET_SELINUX_ENFORCING: &str = "set-selinux-enforcing";
pub const RESTORE_SELINUX_CONTEXT: &str = "restore-selinux-context";
pub const RESTART_HTTPD: &str = "restart-httpd";
pub const DISABLE_DEFAULT_SITE: &str = "a2dissite default";

/// Default attributes, the lowest precedence layer
pub fn default_attributes() -> Value {
    json!({
        "openstack": {
            "dashboard": {
                "server_hostname": null,
                "server_admin": "root@localhost",
                "webroot": "/",
                "http_port": 80,
                "https_port": 443,
                "use_ssl": true,
                "ssl": {
                    "cert_dir": "/etc/pki/tls/certs",
                    "key_dir": "/etc/pki/tls/private",
                    "cert": "horizon.pem",
                    "key": "horizon.key"
                },
                "packages": ["openstack-dashboard"],
                "local_settings_path": "/etc/openstack-dashboard/local_settings",
                "site": "openstack-dashboard",
                "dash_path": "/usr/share/openstack-dashboard/openstack_dashboard",
                "static_path": "/usr/share/openstack-dashboard/static",
                "wsgi_path": "/usr/share/openstack-dashboard/openstack_dashboard/wsgi/django.wsgi",
                "secret_key_path": "/usr/share/openstack-dashboard/openstack_dashboard/local/.secret_key_store",
                "debug": false,
                "allowed_hosts": ["*"],
                "memcached_servers": "127.0.0.1:11211",
                "keystone_host": "127.0.0.1",
                "keystone_url": "http://127.0.0.1:5000/v2.0",
                "keystone_default_role": "_member_",
                "time_zone": "UTC",
                "apache": {
                    "conf_dir": "/etc/httpd/conf.d",
                    "sites_enabled_dir": "/etc/httpd/sites-enabled",
                    "log_dir": "/var/log/httpd",
                    "user": "apache",
                    "group": "apache",
                    "restart_command": "/sbin/service httpd restart"
                },
                "selinux": {
                    "manage": true,
                    "enforce_file": "/sys/fs/selinux/enforce",
                    "config_file": "/etc/selinux/config"
                }
            },
            "db": {
                "dashboard": {
                    "db_type": "mysql",
                    "db_name": "horizon",
                    "host": "127.0.0.1",
                    "port": 3306,
                    "username": "dash",
                    "password": ""
                },
                "python_packages": {
                    "mysql": ["MySQL-python"],
                    "db2": ["db2-odbc", "python-ibm-db", "python-ibm-db-django", "python-ibm-db-sa"],
                    "postgresql": ["python-psycopg2"],
                    "sqlite": []
                }
            }
        }
    })
}

fn django_engine(db_type: &str) -> Result<&'static str> {
    Ok(match db_type {
        "mysql" => "django.db.backends.mysql",
        "postgresql" => "django.db.backends.postgresql_psycopg2",
        "sqlite" => "django.db.backends.sqlite3",
        "db2" => "ibm_db_django",
        other => bail!("unsupported dashboard db_type '{other}'"),
    })
}

/// Declare the dashboard resources into `plan`
pub fn declare(ctx: &RecipeContext<'_>, plan: &mut ExecutionPlan) -> Result<()> {
    let attrs = ctx.attributes;
    let dashboard = "openstack.dashboard";

    let manage_selinux = attrs.bool(&format!("{dashboard}.selinux.manage"))?;
    let enforce_file = attrs.str(&format!("{dashboard}.selinux.enforce_file"))?;
    let selinux_config = attrs.str(&format!("{dashboard}.selinux.config_file"))?;
    let use_ssl = attrs.bool(&format!("{dashboard}.use_ssl"))?;
    let conf_dir = attrs.str(&format!("{dashboard}.apache.conf_dir"))?;
    let site = attrs.str(&format!("{dashboard}.site"))?;

    let db_type = attrs.str("openstack.db.dashboard.db_type")?;
    let engine = django_engine(db_type)?;
    let db_packages = attrs
        .string_list(&format!("openstack.db.python_packages.{db_type}"))
        .with_context(|| format!("No python packages defined for db_type '{db_type}'"))?;

    let server_hostname = match attrs.opt_str(&format!("{dashboard}.server_hostname"))? {
        Some(name) => name,
        None => attrs.str("fqdn")?,
    };
    let cert_path = format!(
        "{}/{}",
        attrs.str(&format!("{dashboard}.ssl.cert_dir"))?,
        attrs.str(&format!("{dashboard}.ssl.cert"))?
    );
    let key_path = format!(
        "{}/{}",
        attrs.str(&format!("{dashboard}.ssl.key_dir"))?,
        attrs.str(&format!("{dashboard}.ssl.key"))?
    );

    let restore = ResourceId::command(RESTORE_SELINUX_CONTEXT);
    let restart = ResourceId::command(RESTART_HTTPD);

    if manage_selinux {
        plan.declare(Resource::command(
            CommandSpec::new(SET_SELINUX_PERMISSIVE, "/sbin/setenforce Permissive").only_if(
                format!("[ -e {enforce_file} ] && [ \"$(cat {enforce_file})\" -eq 1 ]"),
            ),
        ))?;
    }

    for name in attrs
        .string_list(&format!("{dashboard}.packages"))?
        .into_iter()
        .chain(db_packages)
    {
        plan.declare(Resource::package(PackageSpec::new(name)).with_action(Action::Upgrade))?;
    }

    let template_context = json!({
        "node": attrs.as_value(),
        "server_hostname": server_hostname,
        "cert_path": cert_path,
        "key_path": key_path,
        "db_engine": engine,
        "db_remote": db_type != "sqlite",
    });

    let local_settings = ctx
        .template(
            attrs.str(&format!("{dashboard}.local_settings_path"))?,
            "local_settings",
            &template_context,
        )?
        .owner("root")
        .group("root")
        .mode(0o644);
    plan.declare(Resource::file(local_settings).notifies(restart.clone(), Timing::Deferred))?;

    if use_ssl {
        let cert_name = attrs.str(&format!("{dashboard}.ssl.cert"))?;
        let key_name = attrs.str(&format!("{dashboard}.ssl.key"))?;

        let cert = ctx
            .copied(&cert_path, cert_name)?
            .owner("root")
            .group("root")
            .mode(0o644);
        plan.declare(
            Resource::file(cert)
                .notifies(restore.clone(), Timing::Deferred)
                .notifies(restart.clone(), Timing::Deferred),
        )?;

        let key = ctx
            .copied(&key_path, key_name)?
            .owner("root")
            .group("root")
            .mode(0o640);
        plan.declare(
            Resource::file(key)
                .notifies(restore.clone(), Timing::Deferred)
                .notifies(restart.clone(), Timing::Deferred),
        )?;
    }

    let vhost = ctx
        .template(&format!("{conf_dir}/{site}"), "dash-site", &template_context)?
        .owner("root")
        .group("root")
        .mode(0o644);
    plan.declare(
        Resource::file(vhost)
            .notifies(restore.clone(), Timing::Deferred)
            .notifies(restart.clone(), Timing::Deferred),
    )?;

    // The package ships its own vhost under the .conf name, which would shadow ours
    plan.declare(
        Resource::delete(format!("{conf_dir}/{site}.conf"))
            .notifies(restart.clone(), Timing::Deferred),
    )?;

    let sites_enabled = attrs.str(&format!("{dashboard}.apache.sites_enabled_dir"))?;
    plan.declare(
        Resource::command(
            CommandSpec::new(DISABLE_DEFAULT_SITE, "/usr/sbin/a2dissite default")
                .only_if(format!("test -e {sites_enabled}/default")),
        )
        .notifies(restart.clone(), Timing::Deferred),
    )?;

    if manage_selinux {
        plan.declare(Resource::command(
            CommandSpec::new(
                SET_SELINUX_ENFORCING,
                "/sbin/setenforce Enforcing ; restorecon -R /etc/httpd",
            )
            // Hosts configured permissive at boot are left permissive
            .only_if(format!(
                "[ -e {enforce_file} ] && [ \"$(cat {enforce_file})\" -eq 0 ] \
                 && grep -q '^SELINUX=enforcing' {selinux_config}"
            )),
        ))?;
    }

    plan.declare(
        Resource::command(CommandSpec::new(
            RESTORE_SELINUX_CONTEXT,
            "restorecon -Rv /etc/httpd /etc/pki; chcon -R -t httpd_sys_content_t /usr/share/openstack-dashboard || :",
        ))
        .nothing(),
    )?;

    plan.declare(
        Resource::command(CommandSpec::new(
            RESTART_HTTPD,
            attrs.str(&format!("{dashboard}.apache.restart_command"))?,
        ))
        .nothing(),
    )?;

    log::debug!(
        "dashboard recipe declared {} resources for {server_hostname}",
        plan.len()
    );
    Ok(())
}
