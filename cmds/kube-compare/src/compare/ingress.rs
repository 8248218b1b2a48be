//! Ingresses: TLS, then the default backend, then rules.
//!
//! Legacy `v1beta1` objects are converted to `networking.k8s.io/v1` before
//! they reach this module.

use k8s_openapi::api::networking::v1::{
	HTTPIngressPath, Ingress, IngressBackend, IngressRule, IngressSpec, IngressTLS,
};

use super::{both, ensure_count, ensure_same, ensure_same_opt, Verdict};

/// Render a backend as one comparable value.
pub(crate) fn backend_string(backend: &IngressBackend) -> String {
	if let Some(service) = &backend.service {
		let port = service.port.as_ref().map_or_else(String::new, |port| {
			match (&port.name, port.number) {
				(Some(name), _) => name.clone(),
				(None, Some(number)) => number.to_string(),
				(None, None) => String::new(),
			}
		});
		return format!("service {}:{port}", service.name);
	}
	if let Some(resource) = &backend.resource {
		return format!(
			"resource {}/{}/{}",
			resource.api_group.as_deref().unwrap_or_default(),
			resource.kind,
			resource.name
		);
	}
	"<empty>".to_string()
}

fn compare_tls(first: &[IngressTLS], second: &[IngressTLS]) -> Verdict {
	ensure_count("TLS", first.len(), second.len())?;
	for (index, (a, b)) in first.iter().zip(second).enumerate() {
		ensure_same_opt(
			&format!("TLS #{index} secretName"),
			a.secret_name.as_deref(),
			b.secret_name.as_deref(),
		)?;
		let a_hosts = a.hosts.as_deref().unwrap_or_default();
		let b_hosts = b.hosts.as_deref().unwrap_or_default();
		ensure_count(&format!("TLS #{index} host"), a_hosts.len(), b_hosts.len())?;
		for (host_index, (x, y)) in a_hosts.iter().zip(b_hosts).enumerate() {
			ensure_same(&format!("TLS #{index} host #{host_index}"), x, y)?;
		}
	}
	Ok(())
}

fn compare_paths(rule: usize, first: &[HTTPIngressPath], second: &[HTTPIngressPath]) -> Verdict {
	ensure_count(&format!("rule #{rule} path"), first.len(), second.len())?;
	for (index, (a, b)) in first.iter().zip(second).enumerate() {
		let what = format!("rule #{rule} path #{index}");
		ensure_same_opt(&what, a.path.as_deref(), b.path.as_deref())?;
		ensure_same(&format!("{what} pathType"), &a.path_type, &b.path_type)?;
		ensure_same(
			&format!("{what} backend"),
			&backend_string(&a.backend),
			&backend_string(&b.backend),
		)?;
	}
	Ok(())
}

fn compare_rules(first: &[IngressRule], second: &[IngressRule]) -> Verdict {
	ensure_count("rule", first.len(), second.len())?;
	for (index, (a, b)) in first.iter().zip(second).enumerate() {
		ensure_same_opt(
			&format!("rule #{index} host"),
			a.host.as_deref(),
			b.host.as_deref(),
		)?;
		compare_paths(
			index,
			a.http.as_ref().map_or(&[][..], |http| http.paths.as_slice()),
			b.http.as_ref().map_or(&[][..], |http| http.paths.as_slice()),
		)?;
	}
	Ok(())
}

pub fn compare_ingresses(first: &Ingress, second: &Ingress) -> Verdict {
	let empty = IngressSpec::default();
	let a = first.spec.as_ref().unwrap_or(&empty);
	let b = second.spec.as_ref().unwrap_or(&empty);

	compare_tls(
		a.tls.as_deref().unwrap_or_default(),
		b.tls.as_deref().unwrap_or_default(),
	)?;

	if let Some((x, y)) = both(
		"defaultBackend",
		a.default_backend.as_ref(),
		b.default_backend.as_ref(),
	)? {
		ensure_same("defaultBackend", &backend_string(x), &backend_string(y))?;
	}

	compare_rules(
		a.rules.as_deref().unwrap_or_default(),
		b.rules.as_deref().unwrap_or_default(),
	)
}
