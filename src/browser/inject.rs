//! JavaScript injected into recorded and replayed pages.
//!
//! Two scripts: `HELPERS_SCRIPT` gives the driver a query/operation surface
//! with a node registry, `CAPTURE_SCRIPT` streams user interaction events
//! out through the `__recplayEmit` CDP binding. Both are installed for every
//! new document so navigations re-arm them, and both guard against double
//! installation.

/// Name of the CDP binding the capture script emits through.
pub const EMIT_BINDING: &str = "__recplayEmit";

/// Query and node-operation helpers. Node ids handed out by `query` stay
/// valid until the element is detached or the page navigates.
pub const HELPERS_SCRIPT: &str = r#"
(function () {
  if (window.__recplay) { return; }

  const state = { nodes: new Map(), seq: 1, lastMutation: null };

  const observer = new MutationObserver(() => { state.lastMutation = performance.now(); });
  const startObserver = () => {
    if (document.documentElement) {
      observer.observe(document.documentElement, {
        childList: true, subtree: true, attributes: true, characterData: true
      });
    }
  };
  if (document.readyState === 'loading') {
    document.addEventListener('DOMContentLoaded', startObserver, { once: true });
  } else {
    startObserver();
  }

  const register = (el) => {
    for (const [id, node] of state.nodes) {
      if (node === el) return id;
    }
    const id = state.seq++;
    state.nodes.set(id, el);
    return id;
  };

  const visible = (el) => {
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };

  const snapshot = (el) => {
    const rect = el.getBoundingClientRect();
    const text = (el.innerText || el.textContent || '').trim().slice(0, 200);
    const tag = el.tagName.toLowerCase();
    return {
      node: register(el),
      tag: tag,
      id: el.id || null,
      text: text || null,
      name: el.getAttribute('name'),
      ariaLabel: el.getAttribute('aria-label'),
      dataTestId: el.getAttribute('data-testid'),
      role: el.getAttribute('role') || (el.isContentEditable ? 'textbox' : null),
      inputType: tag === 'input' ? (el.getAttribute('type') || 'text') : null,
      className: typeof el.className === 'string' ? (el.className || null) : null,
      placeholder: el.getAttribute('placeholder'),
      autocomplete: el.getAttribute('autocomplete'),
      maxLength: el.maxLength && el.maxLength > 0 ? el.maxLength : null,
      value: typeof el.value === 'string' ? el.value : null,
      checked: typeof el.checked === 'boolean' ? el.checked : null,
      visible: visible(el),
      disabled: el.disabled === true,
      inViewport: rect.top >= 0 && rect.left >= 0 &&
        rect.bottom <= window.innerHeight && rect.right <= window.innerWidth,
      width: rect.width,
      height: rect.height
    };
  };

  const query = (kind, expr) => {
    let els = [];
    if (kind === 'xpath') {
      const res = document.evaluate(expr, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
      for (let i = 0; i < res.snapshotLength; i++) {
        const n = res.snapshotItem(i);
        if (n && n.nodeType === Node.ELEMENT_NODE) els.push(n);
      }
    } else {
      els = Array.from(document.querySelectorAll(expr));
    }
    return els.slice(0, 25).map(snapshot);
  };

  const byId = (id) => {
    const el = state.nodes.get(id);
    if (!el || !el.isConnected) { throw new Error('stale node ' + id); }
    return el;
  };

  const fireInput = (el) => {
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
  };

  const media = (selector) => {
    let el = null;
    if (selector) {
      try { el = document.querySelector(selector); } catch (e) { el = null; }
      if (!el && (selector[0] === '/' || selector.startsWith('(/'))) {
        try {
          const res = document.evaluate(selector, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
          el = res.singleNodeValue;
        } catch (e) { el = null; }
      }
    }
    if (!(el instanceof HTMLMediaElement)) { el = document.querySelector('video'); }
    return el instanceof HTMLMediaElement ? el : null;
  };

  window.__recplay = {
    query: query,
    snapshotById: (id) => snapshot(byId(id)),
    msSinceMutation: () => state.lastMutation === null
      ? null
      : Math.round(performance.now() - state.lastMutation),
    scrollIntoView: (id) => {
      byId(id).scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
    },
    highlight: (id) => {
      const el = byId(id);
      const prev = el.style.outline;
      el.style.outline = '3px solid #f59e0b';
      setTimeout(() => { el.style.outline = prev; }, 900);
    },
    click: (id) => { byId(id).click(); },
    focus: (id) => { byId(id).focus(); },
    setText: (id, value) => {
      const el = byId(id);
      el.focus();
      if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') {
        const proto = el.tagName === 'TEXTAREA'
          ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const desc = Object.getOwnPropertyDescriptor(proto, 'value');
        if (desc && desc.set) { desc.set.call(el, value); } else { el.value = value; }
      } else if (el.isContentEditable) {
        el.textContent = value;
      } else {
        el.value = value;
      }
      fireInput(el);
    },
    setChecked: (id, checked) => {
      const el = byId(id);
      if (el.checked !== checked) { el.click(); }
      if (el.checked !== checked) { el.checked = checked; fireInput(el); }
    },
    selectOption: (id, value) => {
      const el = byId(id);
      el.value = value;
      fireInput(el);
    },
    pressKey: (id, key) => {
      const target = id === null ? (document.activeElement || document.body) : byId(id);
      const opts = { key: key, bubbles: true, cancelable: true };
      const proceed = target.dispatchEvent(new KeyboardEvent('keydown', opts));
      target.dispatchEvent(new KeyboardEvent('keyup', opts));
      if (key === 'Enter' && proceed) {
        const form = target.form || (target.closest && target.closest('form'));
        if (form && form.requestSubmit) { form.requestSubmit(); }
      }
    },
    scrollTo: (id, x, y) => {
      if (id === null) { window.scrollTo(x, y); }
      else { const el = byId(id); el.scrollLeft = x; el.scrollTop = y; }
    },
    submit: (id) => {
      const el = byId(id);
      if (el.requestSubmit) { el.requestSubmit(); } else { el.submit(); }
    },
    mediaState: (selector) => {
      const el = media(selector);
      if (!el) return null;
      return { playing: !el.paused && !el.ended, muted: el.muted, currentTime: el.currentTime, ended: el.ended };
    },
    mediaSeek: (selector, seconds) => {
      const el = media(selector);
      if (!el) { throw new Error('no media element'); }
      el.currentTime = seconds;
    },
    mediaPlay: async (selector, muted) => {
      const el = media(selector);
      if (!el) { return { found: false, started: false }; }
      el.muted = muted;
      try { await el.play(); return { found: true, started: true }; }
      catch (e) { return { found: true, started: false }; }
    },
    mediaPause: (selector) => {
      const el = media(selector);
      if (!el) { throw new Error('no media element'); }
      el.pause();
    }
  };
})();
"#;

/// Interaction capture. Forwards DOM events as JSON through the
/// `__recplayEmit` binding the moment they happen; the recorder does all
/// filtering and classification on the other side.
pub const CAPTURE_SCRIPT: &str = r#"
(function () {
  if (window.__recplayCaptureInstalled) { return; }
  window.__recplayCaptureInstalled = true;

  const MAX_TEXT = 50;
  const TEXT_INPUTS_EXCLUDED = ['checkbox', 'radio', 'button', 'submit', 'reset', 'file', 'image', 'range', 'color', 'hidden'];
  let lastAnchor = null;

  const send = (payload) => {
    try {
      payload.url = window.location.href;
      window.__recplayEmit(JSON.stringify(payload));
    } catch (e) {
      // binding not installed on this frame; drop rather than break the page
    }
  };

  const absPath = (el) => {
    if (!(el instanceof Element)) return null;
    const parts = [];
    let node = el;
    while (node && node.nodeType === Node.ELEMENT_NODE && node.tagName !== 'HTML') {
      let index = 1;
      let hasSame = false;
      let sib = node.previousElementSibling;
      while (sib) {
        if (sib.tagName === node.tagName) index++;
        sib = sib.previousElementSibling;
      }
      sib = node.nextElementSibling;
      while (sib && !hasSame) {
        if (sib.tagName === node.tagName) hasSame = true;
        sib = sib.nextElementSibling;
      }
      parts.unshift(node.tagName.toLowerCase() + ((index > 1 || hasSame) ? '[' + index + ']' : ''));
      node = node.parentElement;
    }
    return '/html/' + parts.join('/');
  };

  const info = (el) => {
    if (!(el instanceof Element)) return {};
    const text = (el.innerText || el.textContent || '').trim().slice(0, MAX_TEXT);
    const aria = el.getAttribute('aria-label');
    const placeholder = el.getAttribute('placeholder');
    const tag = el.tagName.toLowerCase();
    const type = tag === 'input' ? (el.getAttribute('type') || 'text') : null;
    return {
      path: absPath(el),
      tagName: tag,
      text: text || null,
      ariaLabel: aria,
      dataTestId: el.getAttribute('data-testid'),
      role: el.getAttribute('role'),
      name: el.getAttribute('name'),
      displayName: aria || placeholder || text || null,
      inputType: type,
      className: typeof el.className === 'string' ? (el.className || null) : null,
      inForm: !!(el.closest && el.closest('form')),
      formSubmitter: !!(el.closest && el.closest('button[type="submit"], input[type="submit"], button:not([type])')),
      editable: el.isContentEditable || tag === 'textarea' ||
        (tag === 'input' && !TEXT_INPUTS_EXCLUDED.includes(type))
    };
  };

  document.addEventListener('pointerdown', (e) => {
    send({ event: 'pointer_down', target: info(e.target), button: e.button });
  }, true);

  document.addEventListener('click', (e) => {
    send({ event: 'click', target: info(e.target) });
    if (e.target instanceof Element && e.target.closest) {
      const anchor = e.target.closest('a[href]');
      if (anchor) { lastAnchor = { href: anchor.href, at: Date.now() }; }
    }
  }, true);

  document.addEventListener('input', (e) => {
    const el = e.target;
    if (!(el instanceof Element)) return;
    const value = typeof el.value === 'string'
      ? el.value
      : (el.isContentEditable ? el.textContent : null);
    if (value === null) return;
    send({ event: 'input', target: info(el), value: value });
  }, true);

  document.addEventListener('change', (e) => {
    const el = e.target;
    if (!(el instanceof Element)) return;
    const payload = { event: 'change', target: info(el) };
    if (el.tagName === 'SELECT') {
      payload.value = el.value;
    } else if (el.type === 'checkbox' || el.type === 'radio') {
      payload.checked = el.checked;
    } else if (typeof el.value === 'string') {
      payload.value = el.value;
    }
    send(payload);
  }, true);

  document.addEventListener('submit', (e) => {
    send({ event: 'submit', target: info(e.target) });
  }, true);

  document.addEventListener('keydown', (e) => {
    if (e.key !== 'Enter' && e.key !== 'Tab' && e.key !== 'Escape') return;
    send({ event: 'key_down', target: info(e.target), key: e.key });
  }, true);

  document.addEventListener('focusin', (e) => {
    send({ event: 'focus', target: info(e.target) });
  }, true);

  document.addEventListener('scroll', (e) => {
    const t = e.target;
    if (t === document || t === document.documentElement || t === window) {
      send({ event: 'scroll', target: null, x: window.scrollX, y: window.scrollY });
    } else if (t instanceof Element) {
      send({ event: 'scroll', target: info(t), x: t.scrollLeft, y: t.scrollTop });
    }
  }, true);

  document.addEventListener('play', (e) => {
    if (e.target instanceof HTMLMediaElement) {
      send({ event: 'media_play', target: info(e.target), position: e.target.currentTime });
    }
  }, true);

  document.addEventListener('pause', (e) => {
    if (e.target instanceof HTMLMediaElement) {
      send({ event: 'media_pause', target: info(e.target), position: e.target.currentTime });
    }
  }, true);

  document.addEventListener('seeking', (e) => {
    if (e.target instanceof HTMLMediaElement) {
      send({ event: 'media_seeking', target: info(e.target), position: e.target.currentTime });
    }
  }, true);

  window.addEventListener('beforeunload', () => {
    const dest = lastAnchor && (Date.now() - lastAnchor.at) < 2000 ? lastAnchor.href : null;
    send({ event: 'unload', destination: dest });
  });
})();
"#;
