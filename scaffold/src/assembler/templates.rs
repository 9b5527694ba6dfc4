//! Fixed project files emitted with every tree.

use indexmap::IndexMap;
use serde_json::json;

use crate::model::{Page, StylingPlan};

const DEFAULT_PACKAGE_NAME: &str = "nextjs-builder";

/// npm package name for a project title: lowercase, words joined by `-`.
pub(crate) fn package_name(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        DEFAULT_PACKAGE_NAME.to_string()
    } else {
        slug
    }
}

pub(crate) fn package_json(title: &str) -> String {
    pretty(&json!({
        "name": package_name(title),
        "version": "0.1.0",
        "private": true,
        "scripts": {
            "dev": "next dev",
            "build": "next build",
            "start": "next start",
            "lint": "next lint"
        },
        "dependencies": {
            "next": "14.2.5",
            "react": "^18",
            "react-dom": "^18",
            "styled-components": "^6.1.12"
        },
        "devDependencies": {
            "postcss": "^8",
            "tailwindcss": "^3.4.1"
        }
    }))
}

pub(crate) const NEXT_CONFIG: &str = "/** @type {import(\"next\").NextConfig} */\nconst nextConfig = {};\nmodule.exports = nextConfig;\n";

pub(crate) fn jsconfig_json() -> String {
    pretty(&json!({
        "compilerOptions": {
            "baseUrl": ".",
            "paths": {
                "@components/*": ["components/*"],
                "@pages/*": ["pages/*"]
            }
        }
    }))
}

/// Tailwind bootstrap plus one custom property per styling role.
pub(crate) fn globals_css(styling: Option<&StylingPlan>) -> String {
    let mut css = String::from("@tailwind base;\n@tailwind components;\n@tailwind utilities;\n");
    if let Some(styling) = styling.filter(|s| !s.colors.is_empty()) {
        css.push_str("\n:root {\n");
        for (role, color) in &styling.colors {
            css.push_str(&format!("  --color-{}: {color};\n", css_ident(role)));
        }
        css.push_str("}\n");
    }
    css
}

pub(crate) const POSTCSS_CONFIG: &str = "/** @type {import('postcss-load-config').Config} */
const config = {
  plugins: {
    tailwindcss: {},
  },
};

export default config;
";

pub(crate) fn tailwind_config(styling: Option<&StylingPlan>) -> String {
    let colors: IndexMap<String, String> = styling
        .map(|s| {
            s.colors
                .iter()
                .map(|(role, color)| (css_ident(role), color.clone()))
                .collect()
        })
        .unwrap_or_default();
    let colors = serde_json::to_string_pretty(&colors)
        .unwrap_or_else(|_| "{}".to_string())
        .replace('\n', "\n      ");
    format!(
        r#"/** @type {{import('tailwindcss').Config}} */
module.exports = {{
  content: [
    "./pages/**/*.{{js,ts,jsx,tsx,mdx}}",
    "./components/**/*.{{js,ts,jsx,tsx,mdx}}",
    "./app/**/*.{{js,ts,jsx,tsx,mdx}}",
  ],
  theme: {{
    extend: {{
      colors: {colors},
      backgroundImage: {{
        "gradient-radial": "radial-gradient(var(--tw-gradient-stops))",
        "gradient-conic": "conic-gradient(from 180deg at 50% 50%, var(--tw-gradient-stops))",
      }},
    }},
  }},
  plugins: [],
}};
"#
    )
}

/// Navigation entries in page order.
pub(crate) fn routes_config(pages: &[Page]) -> String {
    let routes: Vec<serde_json::Value> = pages
        .iter()
        .zip(super::route_names(pages))
        .map(|(page, route)| {
            json!({
                "name": page.name,
                "path": format!("/{route}"),
            })
        })
        .collect();
    format!("export default {};\n", pretty(&json!(routes)))
}

fn pretty(value: &serde_json::Value) -> String {
    let mut out = serde_json::to_string_pretty(value).unwrap_or_default();
    out.push('\n');
    out
}

/// `Primary Accent` → `primary-accent`
fn css_ident(role: &str) -> String {
    role.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_is_slugged() {
        assert_eq!(package_name("Bob's Bakery"), "bob-s-bakery");
        assert_eq!(package_name("  "), "nextjs-builder");
    }

    #[test]
    fn styling_roles_become_custom_properties() {
        let styling = StylingPlan {
            colors: [("primary".to_string(), "#112233".to_string())].into_iter().collect(),
        };
        let css = globals_css(Some(&styling));
        assert!(css.contains("--color-primary: #112233;"));
        assert!(tailwind_config(Some(&styling)).contains("\"primary\": \"#112233\""));
    }

    #[test]
    fn routes_follow_page_order() {
        let pages = vec![
            Page {
                name: "Home".into(),
                ..Page::default()
            },
            Page {
                name: "About Us".into(),
                ..Page::default()
            },
        ];
        let routes = routes_config(&pages);
        let home = routes.find("/Home").unwrap();
        let about = routes.find("/AboutUs").unwrap();
        assert!(home < about);
    }
}
